use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::ClientError,
    models::notification::{NotificationChannel, NotificationContent, PermissionStatus, Trigger},
};

/// The device's notification service (Expo/FCM/APNs on a phone).
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn is_physical_device(&self) -> bool;
    /// Android-style channels.
    fn supports_channels(&self) -> bool;
    async fn permission_status(&self) -> PermissionStatus;
    async fn request_permission(&self) -> PermissionStatus;
    async fn push_token(&self, project_id: &str) -> Result<String, ClientError>;
    async fn create_channel(&self, channel: &NotificationChannel) -> Result<(), ClientError>;
    /// Returns the platform's id for the scheduled notification.
    async fn schedule(
        &self,
        content: &NotificationContent,
        trigger: Trigger,
    ) -> Result<String, ClientError>;
    async fn cancel(&self, id: &str) -> Result<(), ClientError>;
    async fn cancel_all(&self) -> Result<(), ClientError>;
}

/// Desktop/CLI stand-in: no push token, no permission, local notifications
/// are only kept in memory and logged.
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    scheduled: Mutex<HashMap<String, (NotificationContent, Trigger)>>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending(&self) -> usize {
        self.scheduled.lock().await.len()
    }
}

#[async_trait]
impl PushPlatform for HeadlessPlatform {
    fn is_physical_device(&self) -> bool {
        false
    }

    fn supports_channels(&self) -> bool {
        false
    }

    async fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Denied
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Denied
    }

    async fn push_token(&self, _project_id: &str) -> Result<String, ClientError> {
        Err(ClientError::InvalidInput(
            "Push tokens require a physical device".into(),
        ))
    }

    async fn create_channel(&self, _channel: &NotificationChannel) -> Result<(), ClientError> {
        Ok(())
    }

    async fn schedule(
        &self,
        content: &NotificationContent,
        trigger: Trigger,
    ) -> Result<String, ClientError> {
        let id = Uuid::new_v4().to_string();
        debug!("Local notification {} scheduled ({:?}): {}", id, trigger, content.title);
        self.scheduled
            .lock()
            .await
            .insert(id.clone(), (content.clone(), trigger));
        Ok(id)
    }

    async fn cancel(&self, id: &str) -> Result<(), ClientError> {
        self.scheduled.lock().await.remove(id);
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), ClientError> {
        self.scheduled.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn headless_keeps_schedules_in_memory() {
        let platform = HeadlessPlatform::new();
        let content = NotificationContent {
            title: "t".into(),
            body: "b".into(),
            data: Value::Null,
            sound: false,
        };
        let id = platform.schedule(&content, Trigger::Immediate).await.unwrap();
        platform.schedule(&content, Trigger::Immediate).await.unwrap();
        assert_eq!(platform.pending().await, 2);
        platform.cancel(&id).await.unwrap();
        assert_eq!(platform.pending().await, 1);
        platform.cancel_all().await.unwrap();
        assert_eq!(platform.pending().await, 0);
        assert!(platform.push_token("p").await.is_err());
    }
}
