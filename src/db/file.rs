use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use super::KeyValueStore;
use crate::error::ClientError;

/// One file per key under `dir`. Writes go through a temp file and a rename
/// so a reader never sees half a value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ClientError::Storage(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        // Keys are crate constants, but never let one escape the directory.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ClientError::Storage(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).await.unwrap();

        assert_eq!(store.get("session").await.unwrap(), None);
        store.set("session", r#"{"token":"t"}"#).await.unwrap();
        assert_eq!(
            store.get("session").await.unwrap().as_deref(),
            Some(r#"{"token":"t"}"#)
        );

        store.remove("session").await.unwrap();
        assert_eq!(store.get("session").await.unwrap(), None);
        // removing twice is fine
        store.remove("session").await.unwrap();
    }

    #[tokio::test]
    async fn keys_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.set("../outside", "x").await.unwrap();
        assert!(dir.path().join("___outside.json").exists());
    }
}
