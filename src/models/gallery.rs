use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error string the backend returns when a family has no gallery yet.
pub const GALLERY_NOT_FOUND: &str = "Gallery not found";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub id: String,
    #[serde(default)]
    pub family_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub gallery_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Photo,
    Video,
}

impl MediaType {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Photo
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: String,
    pub gallery_id: String,
    #[serde(default)]
    pub album_id: Option<String>,
    pub url: String,
    /// Blob storage key, needed for deletion.
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `GET /gallery` payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPayload {
    #[serde(default)]
    pub gallery: Option<Gallery>,
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Serialize)]
pub struct CreateGalleryRequest<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest<'a> {
    pub gallery_id: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaRequest<'a> {
    pub gallery_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<&'a str>,
    pub url: &'a str,
    pub storage_path: &'a str,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<&'a str>,
}

/// Raw file content as handed over by the picker. Native pickers give base64,
/// web pickers give bytes.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Base64(String),
    Bytes(Bytes),
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub file_name: String,
    /// Guessed from `file_name` when absent.
    pub content_type: Option<String>,
    pub source: MediaSource,
    pub album_id: Option<String>,
    pub caption: Option<String>,
}
