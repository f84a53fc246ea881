pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::ClientError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the serialized `{ user, token }` session.
pub const SESSION_KEY: &str = "session";
/// Key holding the serialized notification settings.
pub const NOTIFICATION_SETTINGS_KEY: &str = "notification_settings";

/// Durable string key-value storage (AsyncStorage on device, a directory on
/// desktop, a map in tests).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    async fn remove(&self, key: &str) -> Result<(), ClientError>;
}
