use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    db::{KeyValueStore, NOTIFICATION_SETTINGS_KEY},
    error::ClientError,
    models::{
        calendar::CalendarEvent,
        notification::{
            NotificationContent, NotificationKind, NotificationSettings, PermissionStatus,
            PushRegistration, RegisterTokenRequest, SettingsPatch, Trigger, CHANNELS,
        },
    },
    routes::api,
    services::{
        api::{ApiClient, ApiRequest},
        push::PushPlatform,
        registration::PushRegistrar,
    },
};

/// Push permissions, the device push token, its registration with the
/// backend, local notifications and the local notification settings.
pub struct NotificationRegistry {
    platform: Arc<dyn PushPlatform>,
    api: ApiClient,
    storage: Arc<dyn KeyValueStore>,
    project_id: Option<String>,
    device_type: String,
    registration: watch::Sender<PushRegistration>,
    /// Auth token the current push token was registered under.
    registered_with: Mutex<Option<String>>,
    settings: watch::Sender<NotificationSettings>,
    settings_writes: Mutex<()>,
}

impl NotificationRegistry {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        api: ApiClient,
        storage: Arc<dyn KeyValueStore>,
        project_id: Option<String>,
        device_type: impl Into<String>,
    ) -> Self {
        let (registration, _) = watch::channel(PushRegistration::default());
        let (settings, _) = watch::channel(NotificationSettings::default());
        Self {
            platform,
            api,
            storage,
            project_id,
            device_type: device_type.into(),
            registration,
            registered_with: Mutex::new(None),
            settings,
            settings_writes: Mutex::new(()),
        }
    }

    pub fn registration(&self) -> PushRegistration {
        self.registration.borrow().clone()
    }

    pub fn subscribe_registration(&self) -> watch::Receiver<PushRegistration> {
        self.registration.subscribe()
    }

    /// Ask for notification permission if it has not been granted yet.
    /// Simulators and desktops always get `false`.
    pub async fn request_permissions(&self) -> bool {
        if !self.platform.is_physical_device() {
            debug!("Push notifications need a physical device");
            return false;
        }
        let status = match self.platform.permission_status().await {
            PermissionStatus::Granted => PermissionStatus::Granted,
            _ => self.platform.request_permission().await,
        };
        if status != PermissionStatus::Granted {
            info!("Notification permission not granted");
        }
        status == PermissionStatus::Granted
    }

    /// The device push token, fetched once and cached.
    pub async fn get_push_token(&self) -> Option<String> {
        let cached = self.registration.borrow().push_token.clone();
        if cached.is_some() {
            return cached;
        }
        if !self.platform.is_physical_device() {
            return None;
        }
        let Some(project_id) = self.project_id.as_deref() else {
            warn!("PUSH_PROJECT_ID not configured, cannot fetch a push token");
            return None;
        };

        match self.platform.push_token(project_id).await {
            Ok(token) => {
                self.registration
                    .send_modify(|r| r.push_token = Some(token.clone()));
                Some(token)
            }
            Err(e) => {
                warn!("Failed to get push token: {}", e);
                None
            }
        }
    }

    /// Channels, permission, token and, given an auth token, backend
    /// registration. A backend failure is logged; the push token is still
    /// returned.
    pub async fn register_for_push_notifications(&self, auth_token: Option<&str>) -> Option<String> {
        if self.platform.supports_channels() {
            for channel in CHANNELS.iter() {
                if let Err(e) = self.platform.create_channel(channel).await {
                    warn!("Failed to create notification channel {}: {}", channel.id, e);
                }
            }
        }

        if !self.request_permissions().await {
            return None;
        }
        let push_token = self.get_push_token().await?;

        if let Some(auth_token) = auth_token {
            if !self.register_token_with_backend(&push_token, auth_token).await {
                warn!("Push token obtained but backend registration failed");
            }
        }
        Some(push_token)
    }

    /// `POST /notifications/register-token`. Never fails; false on any error.
    pub async fn register_token_with_backend(&self, push_token: &str, auth_token: &str) -> bool {
        let request = match ApiRequest::post(api::REGISTER_PUSH_TOKEN).json(&RegisterTokenRequest {
            device_type: &self.device_type,
            token: push_token,
        }) {
            Ok(request) => request,
            Err(e) => {
                warn!("Push token registration: {}", e);
                return false;
            }
        };

        let response = self.api.authenticated_call(request, auth_token).await;
        if let Err(e) = response.ensure_success() {
            warn!("Backend rejected push token registration: {}", e);
            return false;
        }

        *self.registered_with.lock().await = Some(auth_token.to_string());
        self.registration.send_modify(|r| {
            r.push_token = Some(push_token.to_string());
            r.is_registered = true;
        });
        info!("Push token registered with backend");
        true
    }

    /// `POST /notifications/unregister-token` for the cached push token.
    pub async fn unregister_token_with_backend(&self, auth_token: &str) -> bool {
        let Some(push_token) = self.registration.borrow().push_token.clone() else {
            return false;
        };
        let request = match ApiRequest::post(api::UNREGISTER_PUSH_TOKEN).json(&RegisterTokenRequest {
            device_type: &self.device_type,
            token: &push_token,
        }) {
            Ok(request) => request,
            Err(_) => return false,
        };

        let response = self.api.authenticated_call(request, auth_token).await;
        if let Err(e) = response.ensure_success() {
            warn!("Push token unregistration failed: {}", e);
            return false;
        }
        *self.registered_with.lock().await = None;
        self.registration.send_modify(|r| r.is_registered = false);
        true
    }

    /// Registered with the backend under exactly this auth token.
    pub async fn is_registered_for(&self, auth_token: &str) -> bool {
        let is_registered = self.registration.borrow().is_registered;
        is_registered && self.registered_with.lock().await.as_deref() == Some(auth_token)
    }

    // Local notifications

    pub async fn schedule_local_notification(
        &self,
        mut content: NotificationContent,
        trigger: Option<Trigger>,
    ) -> Result<String, ClientError> {
        let trigger = trigger.unwrap_or(Trigger::Immediate);
        if let Trigger::Every { seconds: 0, .. } = trigger {
            return Err(ClientError::InvalidInput(
                "Repeat interval must be at least one second".into(),
            ));
        }
        if !self.settings().sound_enabled {
            content.sound = false;
        }
        self.platform.schedule(&content, trigger).await
    }

    pub async fn cancel_notification(&self, id: &str) -> Result<(), ClientError> {
        self.platform.cancel(id).await
    }

    pub async fn cancel_all_notifications(&self) -> Result<(), ClientError> {
        self.platform.cancel_all().await
    }

    pub async fn schedule_event_reminder(
        &self,
        event: &CalendarEvent,
        minutes_before: i64,
    ) -> Result<String, ClientError> {
        self.ensure_enabled(NotificationKind::EventReminder)?;
        let at = reminder_time(event.starts_at(), ChronoDuration::minutes(minutes_before))?;

        let body = match event.kind.timing().and_then(|t| t.location.as_deref()) {
            Some(location) => format!("{} starts in {} minutes at {}", event.title, minutes_before, location),
            None => format!("{} starts in {} minutes", event.title, minutes_before),
        };
        let content = self.content(
            NotificationKind::EventReminder,
            "Upcoming event",
            body,
            json!({ "type": "event_reminder", "eventId": event.id }),
        );
        self.schedule_local_notification(content, Some(Trigger::At(at)))
            .await
    }

    pub async fn schedule_family_update(
        &self,
        member_name: &str,
        update: &str,
    ) -> Result<String, ClientError> {
        self.ensure_enabled(NotificationKind::FamilyUpdate)?;
        let content = self.content(
            NotificationKind::FamilyUpdate,
            "Family update",
            format!("{member_name} {update}"),
            json!({ "type": "family_update" }),
        );
        self.schedule_local_notification(content, None).await
    }

    pub async fn schedule_photo_update(
        &self,
        uploader_name: &str,
        photo_count: usize,
        album_name: Option<&str>,
    ) -> Result<String, ClientError> {
        self.ensure_enabled(NotificationKind::PhotoUpdate)?;
        let photos = if photo_count == 1 {
            "1 new photo".to_string()
        } else {
            format!("{photo_count} new photos")
        };
        let body = match album_name {
            Some(album) => format!("{uploader_name} added {photos} to {album}"),
            None => format!("{uploader_name} added {photos}"),
        };
        let content = self.content(
            NotificationKind::PhotoUpdate,
            "New photos",
            body,
            json!({ "type": "photo_update", "album": album_name }),
        );
        self.schedule_local_notification(content, None).await
    }

    /// Reminder before a custody schedule starts. Only `Schedule` events have
    /// a responsible parent and a range.
    pub async fn schedule_schedule_reminder(
        &self,
        event: &CalendarEvent,
        hours_before: i64,
    ) -> Result<String, ClientError> {
        self.ensure_enabled(NotificationKind::ScheduleReminder)?;
        let range = event
            .kind
            .schedule()
            .ok_or_else(|| ClientError::InvalidInput(format!("{} is not a schedule", event.title)))?;
        let at = reminder_time(event.starts_at(), ChronoDuration::hours(hours_before))?;

        let body = match range.responsible_parent.as_deref() {
            Some(parent) => format!("{} with {} starts in {} hours", event.title, parent, hours_before),
            None => format!("{} starts in {} hours", event.title, hours_before),
        };
        let content = self.content(
            NotificationKind::ScheduleReminder,
            "Schedule reminder",
            body,
            json!({ "type": "schedule_reminder", "eventId": event.id }),
        );
        self.schedule_local_notification(content, Some(Trigger::At(at)))
            .await
    }

    fn ensure_enabled(&self, kind: NotificationKind) -> Result<(), ClientError> {
        if self.settings().allows(kind) {
            Ok(())
        } else {
            Err(ClientError::NotificationsDisabled(kind.label()))
        }
    }

    fn content(
        &self,
        kind: NotificationKind,
        title: &str,
        body: String,
        mut data: serde_json::Value,
    ) -> NotificationContent {
        data["channelId"] = json!(kind.channel_id());
        NotificationContent {
            title: title.to_string(),
            body,
            data,
            sound: true,
        }
    }

    // Settings

    pub fn settings(&self) -> NotificationSettings {
        *self.settings.borrow()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<NotificationSettings> {
        self.settings.subscribe()
    }

    /// Load persisted settings. Missing or unreadable records fall back to
    /// the defaults.
    pub async fn load_settings(&self) -> NotificationSettings {
        let _guard = self.settings_writes.lock().await;
        let loaded = match self.storage.get(NOTIFICATION_SETTINGS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Notification settings unreadable ({}), using defaults", e);
                NotificationSettings::default()
            }),
            Ok(None) => NotificationSettings::default(),
            Err(e) => {
                warn!("Failed to load notification settings: {}", e);
                NotificationSettings::default()
            }
        };
        self.settings.send_replace(loaded);
        loaded
    }

    /// Merge, persist, then publish. Readers see either the old or the new
    /// record, never a half-applied one.
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<NotificationSettings, ClientError> {
        let _guard = self.settings_writes.lock().await;
        let next = self.settings().apply(&patch);
        let raw = serde_json::to_string(&next).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.storage.set(NOTIFICATION_SETTINGS_KEY, &raw).await?;
        self.settings.send_replace(next);
        Ok(next)
    }
}

#[async_trait]
impl PushRegistrar for NotificationRegistry {
    async fn is_registered(&self, auth_token: &str) -> bool {
        self.is_registered_for(auth_token).await
    }

    async fn register(&self, auth_token: &str) -> bool {
        let Some(push_token) = self.register_for_push_notifications(None).await else {
            return false;
        };
        self.register_token_with_backend(&push_token, auth_token).await
    }
}

/// `start - offset`, as a UTC instant. `start` is local wall-clock time.
fn reminder_time(start: NaiveDateTime, offset: ChronoDuration) -> Result<DateTime<Utc>, ClientError> {
    let start = Local
        .from_local_datetime(&start)
        .earliest()
        .ok_or_else(|| ClientError::InvalidInput("Event time does not exist in the local time zone".into()))?;
    let at = start.with_timezone(&Utc) - offset;
    if at <= Utc::now() {
        return Err(ClientError::InvalidInput("Reminder time has already passed".into()));
    }
    Ok(at)
}
