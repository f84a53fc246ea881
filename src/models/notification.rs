use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local toggles, never synced to the server. Everything is on by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub push_enabled: bool,
    pub event_reminders: bool,
    pub family_updates: bool,
    pub photo_updates: bool,
    pub schedule_reminders: bool,
    pub sound_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            push_enabled: true,
            event_reminders: true,
            family_updates: true,
            photo_updates: true,
            schedule_reminders: true,
            sound_enabled: true,
        }
    }
}

impl NotificationSettings {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        self.push_enabled
            && match kind {
                NotificationKind::EventReminder => self.event_reminders,
                NotificationKind::FamilyUpdate => self.family_updates,
                NotificationKind::PhotoUpdate => self.photo_updates,
                NotificationKind::ScheduleReminder => self.schedule_reminders,
            }
    }

    /// Shallow merge of the fields set in `patch`.
    pub fn apply(mut self, patch: &SettingsPatch) -> Self {
        let fields = [
            (&mut self.push_enabled, patch.push_enabled),
            (&mut self.event_reminders, patch.event_reminders),
            (&mut self.family_updates, patch.family_updates),
            (&mut self.photo_updates, patch.photo_updates),
            (&mut self.schedule_reminders, patch.schedule_reminders),
            (&mut self.sound_enabled, patch.sound_enabled),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub push_enabled: Option<bool>,
    pub event_reminders: Option<bool>,
    pub family_updates: Option<bool>,
    pub photo_updates: Option<bool>,
    pub schedule_reminders: Option<bool>,
    pub sound_enabled: Option<bool>,
}

impl SettingsPatch {
    /// Set one field by its wire name (`eventReminders`, ...).
    pub fn set(&mut self, key: &str, value: bool) -> Result<(), String> {
        let slot = match key {
            "pushEnabled" => &mut self.push_enabled,
            "eventReminders" => &mut self.event_reminders,
            "familyUpdates" => &mut self.family_updates,
            "photoUpdates" => &mut self.photo_updates,
            "scheduleReminders" => &mut self.schedule_reminders,
            "soundEnabled" => &mut self.sound_enabled,
            other => return Err(format!("unknown setting: {other}")),
        };
        *slot = Some(value);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    EventReminder,
    FamilyUpdate,
    PhotoUpdate,
    ScheduleReminder,
}

impl NotificationKind {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::EventReminder => "Event reminder",
            NotificationKind::FamilyUpdate => "Family update",
            NotificationKind::PhotoUpdate => "Photo update",
            NotificationKind::ScheduleReminder => "Schedule reminder",
        }
    }

    pub fn channel_id(&self) -> &'static str {
        match self {
            NotificationKind::EventReminder => "events",
            NotificationKind::FamilyUpdate => "family",
            NotificationKind::PhotoUpdate => "photos",
            NotificationKind::ScheduleReminder => "schedules",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub data: Value,
    pub sound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Immediate,
    At(DateTime<Utc>),
    Every { seconds: u64, repeats: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Default,
    High,
}

/// Android-style channel; ignored by platforms without channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: &'static str,
    pub name: &'static str,
    pub importance: Importance,
}

pub const CHANNELS: [NotificationChannel; 5] = [
    NotificationChannel { id: "default", name: "General", importance: Importance::Default },
    NotificationChannel { id: "events", name: "Event reminders", importance: Importance::High },
    NotificationChannel { id: "family", name: "Family updates", importance: Importance::Default },
    NotificationChannel { id: "photos", name: "Photo updates", importance: Importance::Default },
    NotificationChannel { id: "schedules", name: "Schedule reminders", importance: Importance::High },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushRegistration {
    pub push_token: Option<String>,
    pub is_registered: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest<'a> {
    pub device_type: &'a str,
    pub token: &'a str,
}
