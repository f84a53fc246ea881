use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::{
    error::ClientError,
    services::transport::{Body, HttpRequest, HttpTransport, Method},
};

/// Object storage for gallery media.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a publicly reachable URL.
    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        timeout: Duration,
    ) -> Result<String, ClientError>;

    async fn delete(&self, key: &str) -> Result<(), ClientError>;
}

/// Supabase-style storage REST API:
/// `POST {base}/object/{bucket}/{key}` to upload,
/// `GET {base}/object/public/{bucket}/{key}` to read,
/// `DELETE {base}/object/{bucket}/{key}` to remove.
pub struct HttpBlobStore {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpBlobStore {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            bucket: bucket.into(),
            api_key,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, key)
    }

    fn request(&self, method: Method, key: &str) -> HttpRequest {
        let request = HttpRequest::new(method, self.object_url(key));
        match &self.api_key {
            Some(api_key) => request.bearer(api_key),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        timeout: Duration,
    ) -> Result<String, ClientError> {
        let size = bytes.len();
        let mut request = self.request(Method::Post, key);
        request.body = Some(Body::Bytes {
            bytes,
            content_type: content_type.to_string(),
        });
        request.timeout = Some(timeout);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ClientError::Blob(e.to_string()))?;
        if !(200..300).contains(&response.status) {
            return Err(ClientError::Blob(format!(
                "upload of {} failed with status {}",
                key, response.status
            )));
        }
        debug!("Uploaded {} ({} bytes)", key, size);
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let response = self
            .transport
            .send(self.request(Method::Delete, key))
            .await
            .map_err(|e| ClientError::Blob(e.to_string()))?;
        if !(200..300).contains(&response.status) {
            return Err(ClientError::Blob(format!(
                "delete of {} failed with status {}",
                key, response.status
            )));
        }
        Ok(())
    }
}

/// Used when no storage endpoint is configured. Every call fails.
#[derive(Debug, Default)]
pub struct DisabledBlobStore;

#[async_trait]
impl BlobStore for DisabledBlobStore {
    async fn upload(&self, _: &str, _: Bytes, _: &str, _: Duration) -> Result<String, ClientError> {
        Err(ClientError::Blob("Blob storage is not configured".into()))
    }

    async fn delete(&self, _: &str) -> Result<(), ClientError> {
        Err(ClientError::Blob("Blob storage is not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedTransport};

    #[tokio::test]
    async fn upload_posts_bytes_and_returns_public_url() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on(Method::Post, "/object/family-media/g1/1_a.jpg", Reply::raw(200, "{}"));
        let store = HttpBlobStore::new(
            transport.clone(),
            "https://blob.test/storage/v1",
            "family-media",
            Some("key".into()),
        );

        let url = store
            .upload("g1/1_a.jpg", Bytes::from_static(b"jpeg"), "image/jpeg", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(url, "https://blob.test/storage/v1/object/public/family-media/g1/1_a.jpg");

        let sent = transport.requests();
        assert_eq!(sent[0].header_value("authorization"), Some("Bearer key"));
        assert_eq!(sent[0].timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            sent[0].body,
            Some(Body::Bytes {
                bytes: Bytes::from_static(b"jpeg"),
                content_type: "image/jpeg".into()
            })
        );
    }

    #[tokio::test]
    async fn rejected_upload_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.on(Method::Post, "/object/family-media/k", Reply::raw(403, "denied"));
        let store = HttpBlobStore::new(transport, "https://blob.test", "family-media", None);
        let err = store
            .upload("k", Bytes::new(), "image/png", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Blob(_)));
    }

    #[tokio::test]
    async fn disabled_store_refuses() {
        assert!(DisabledBlobStore.delete("k").await.is_err());
    }
}
