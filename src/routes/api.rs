//! Backend endpoint paths, relative to `{API_BASE_URL}{API_PREFIX}`.

pub const HEALTH: &str = "/health";

// Auth
pub const LOGIN: &str = "/auth/login";
pub const SIGNUP: &str = "/auth/signup";
pub const FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const PROFILE: &str = "/auth/profile";
pub const ACCOUNT: &str = "/auth/account";

// Gallery
pub const GALLERY: &str = "/gallery";
pub const GALLERY_ALBUMS: &str = "/gallery/albums";
pub const GALLERY_MEDIA: &str = "/gallery/media";

pub fn gallery_media(id: &str) -> String {
    format!("{GALLERY_MEDIA}/{id}")
}

// Calendar
pub const CALENDAR_EVENTS: &str = "/calendar/events";

pub fn calendar_event(id: &str) -> String {
    format!("{CALENDAR_EVENTS}/{id}")
}

// Schools
pub const SCHOOLS: &str = "/schools";

pub fn school_events(school_id: &str) -> String {
    format!("{SCHOOLS}/{school_id}/events")
}

// Notifications
pub const REGISTER_PUSH_TOKEN: &str = "/notifications/register-token";
pub const UNREGISTER_PUSH_TOKEN: &str = "/notifications/unregister-token";
