use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    error::ClientError,
    models::{
        envelope::{ApiResponse, ResponseOrigin},
        gallery::{
            Album, CreateAlbumRequest, CreateGalleryRequest, CreateMediaRequest, Gallery,
            GalleryPayload, Media, MediaSource, MediaType, NewMedia, GALLERY_NOT_FOUND,
        },
    },
    routes::api,
    services::{
        api::{ApiClient, ApiRequest},
        blob::BlobStore,
        resource::{refetch_on_token_change, upsert_by_id, InFlight, Keyed, VersionGate},
        session::SessionStore,
    },
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryState {
    pub gallery: Option<Gallery>,
    pub albums: Vec<Album>,
    pub media: Vec<Media>,
    pub loading: bool,
    pub error: Option<String>,
    /// The family has no gallery yet. Not an error.
    pub needs_gallery_creation: bool,
    pub creating_gallery: bool,
    pub creating_album: bool,
    pub adding_media: bool,
    pub deleting_media: bool,
}

impl GalleryState {
    fn clear_collections(&mut self) {
        self.gallery = None;
        self.albums.clear();
        self.media.clear();
    }
}

impl Keyed for Album {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Media {
    fn key(&self) -> &str {
        &self.id
    }
}

/// The family's gallery, albums and media.
pub struct GalleryResource {
    api: ApiClient,
    session: Arc<SessionStore>,
    blob: Arc<dyn BlobStore>,
    upload_timeout: Duration,
    state: watch::Sender<GalleryState>,
    gate: VersionGate,
}

impl GalleryResource {
    pub fn new(
        api: ApiClient,
        session: Arc<SessionStore>,
        blob: Arc<dyn BlobStore>,
        upload_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(GalleryState::default());
        Self {
            api,
            session,
            blob,
            upload_timeout,
            state,
            gate: VersionGate::new(),
        }
    }

    pub fn snapshot(&self) -> GalleryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryState> {
        self.state.subscribe()
    }

    /// Refetch now and on every token change.
    pub fn watch_session(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        refetch_on_token_change(self.session.subscribe(), move || {
            let this = Arc::clone(&this);
            async move { this.refetch().await }
        })
    }

    pub async fn refetch(&self) {
        // Taken before the token check so a signed-out refetch also voids
        // any fetch still running under the previous token.
        let ticket = self.gate.begin_fetch();
        let Some(token) = self.session.token() else {
            self.state.send_modify(|s| {
                if self.gate.is_latest_fetch(ticket) {
                    s.clear_collections();
                    s.needs_gallery_creation = false;
                    s.loading = false;
                    s.error = Some(ClientError::NotAuthenticated.to_string());
                }
            });
            return;
        };

        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let response = self
            .api
            .authenticated_call(ApiRequest::get(api::GALLERY), &token)
            .await;
        let outcome = if is_missing_gallery(&response) {
            Ok(None)
        } else {
            response.into_data::<GalleryPayload>().map(Some)
        };

        self.state.send_modify(|s| {
            if self.gate.is_current(ticket) {
                match outcome {
                    Ok(Some(payload)) if payload.gallery.is_some() => {
                        s.gallery = payload.gallery;
                        s.albums = payload.albums;
                        s.media = payload.media;
                        s.needs_gallery_creation = false;
                    }
                    Ok(_) => {
                        s.clear_collections();
                        s.needs_gallery_creation = true;
                    }
                    Err(e) => {
                        s.clear_collections();
                        s.needs_gallery_creation = false;
                        s.error = Some(e.user_message());
                    }
                }
            }
            if self.gate.is_latest_fetch(ticket) {
                s.loading = false;
            }
        });
    }

    pub async fn create_gallery(&self, name: &str) -> Result<Gallery, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.creating_gallery);

        let request = ApiRequest::post(api::GALLERY).json(&CreateGalleryRequest { name })?;
        let gallery: Gallery = self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()?;

        info!("Gallery {} created", gallery.id);
        self.gate.commit_mutation();
        self.state.send_modify(|s| {
            s.gallery = Some(gallery.clone());
            s.needs_gallery_creation = false;
            s.error = None;
        });
        Ok(gallery)
    }

    pub async fn create_album(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Album, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let gallery_id = self.gallery_id()?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.creating_album);

        let request = ApiRequest::post(api::GALLERY_ALBUMS).json(&CreateAlbumRequest {
            gallery_id: &gallery_id,
            name,
            description,
        })?;
        let album: Album = self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()?;

        self.gate.commit_mutation();
        self.state
            .send_modify(|s| upsert_by_id(&mut s.albums, album.clone()));
        Ok(album)
    }

    /// Upload the file to blob storage, then record it. If recording fails the
    /// uploaded object is removed again.
    pub async fn add_media(&self, new_media: NewMedia) -> Result<Media, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let gallery_id = self.gallery_id()?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.adding_media);

        let bytes = decode_source(new_media.source)?;
        let content_type = new_media.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&new_media.file_name)
                .first_or_octet_stream()
                .to_string()
        });
        let key = storage_key(
            &gallery_id,
            chrono::Utc::now().timestamp_millis(),
            &new_media.file_name,
        );

        let url = match tokio::time::timeout(
            self.upload_timeout,
            self.blob
                .upload(&key, bytes, &content_type, self.upload_timeout),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout("Upload")),
        };

        let request = ApiRequest::post(api::GALLERY_MEDIA).json(&CreateMediaRequest {
            gallery_id: &gallery_id,
            album_id: new_media.album_id.as_deref(),
            url: &url,
            storage_path: &key,
            media_type: MediaType::from_content_type(&content_type),
            caption: new_media.caption.as_deref(),
        })?;
        let media: Media = match self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()
        {
            Ok(media) => media,
            Err(e) => {
                if let Err(cleanup) = self.blob.delete(&key).await {
                    warn!("Gallery: orphaned upload {} not removed: {}", key, cleanup);
                }
                return Err(e);
            }
        };

        self.gate.commit_mutation();
        self.state
            .send_modify(|s| upsert_by_id(&mut s.media, media.clone()));
        Ok(media)
    }

    /// Delete the blob (best effort), then the record (authoritative). The
    /// local list is pruned only once the record is gone.
    pub async fn delete_media(&self, media_id: &str) -> Result<(), ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let _busy = InFlight::raise(&self.state, |s| &mut s.deleting_media);

        let storage_path = self
            .state
            .borrow()
            .media
            .iter()
            .find(|m| m.id == media_id)
            .and_then(|m| m.storage_path.clone());
        match storage_path {
            Some(path) => {
                if let Err(e) = self.blob.delete(&path).await {
                    warn!("Gallery: blob delete for {} failed: {}", path, e);
                }
            }
            None => warn!("Gallery: media {} has no storage path, skipping blob delete", media_id),
        }

        self.api
            .authenticated_call(ApiRequest::delete(api::gallery_media(media_id)), &token)
            .await
            .ensure_success()?;

        self.gate.commit_mutation();
        self.state.send_modify(|s| s.media.retain(|m| m.id != media_id));
        Ok(())
    }

    fn gallery_id(&self) -> Result<String, ClientError> {
        self.state
            .borrow()
            .gallery
            .as_ref()
            .map(|g| g.id.clone())
            .ok_or_else(|| ClientError::InvalidInput("Create a gallery first".into()))
    }
}

fn is_missing_gallery(response: &ApiResponse) -> bool {
    !response.success
        && response.origin == ResponseOrigin::Server
        && (response.is_not_found()
            || response.error.as_deref() == Some(GALLERY_NOT_FOUND)
            || response.message.as_deref() == Some(GALLERY_NOT_FOUND))
}

fn decode_source(source: MediaSource) -> Result<Bytes, ClientError> {
    match source {
        MediaSource::Bytes(bytes) => Ok(bytes),
        MediaSource::Base64(encoded) => {
            // data:image/jpeg;base64,....
            let payload = match encoded.split_once(";base64,") {
                Some((_, rest)) => rest,
                None => encoded.as_str(),
            };
            STANDARD
                .decode(payload.trim())
                .map(Bytes::from)
                .map_err(|e| ClientError::InvalidInput(format!("Invalid base64 media: {e}")))
        }
    }
}

fn storage_key(gallery_id: &str, millis: i64, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{gallery_id}/{millis}_{safe}")
}
