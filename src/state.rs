use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::Config,
    db::{FileStore, KeyValueStore},
    middleware::UnauthorizedHandler,
    services::{
        api::ApiClient,
        auth::AuthSession,
        blob::{BlobStore, DisabledBlobStore, HttpBlobStore},
        calendar::CalendarResource,
        gallery::GalleryResource,
        metrics::Metrics,
        notifications::NotificationRegistry,
        push::{HeadlessPlatform, PushPlatform},
        registration::{RegistrationOrchestrator, RetryPolicy},
        schools::SchoolsResource,
        session::SessionStore,
        shell::{AppShell, TracingShell},
        transport::{HttpTransport, ReqwestTransport},
    },
};

/// Everything that talks to the outside world. Swapped for fakes in tests.
pub struct Platform {
    pub transport: Arc<dyn HttpTransport>,
    pub storage: Arc<dyn KeyValueStore>,
    pub shell: Arc<dyn AppShell>,
    pub push: Arc<dyn PushPlatform>,
    pub blob: Arc<dyn BlobStore>,
}

impl Platform {
    /// reqwest transport, file storage under `data_dir`, log-only shell and
    /// push platform.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let storage = FileStore::open(&config.data_dir).await?;
        let blob: Arc<dyn BlobStore> = match &config.blob_storage_url {
            Some(url) => Arc::new(HttpBlobStore::new(
                transport.clone(),
                url.clone(),
                config.blob_bucket.clone(),
                config.blob_api_key.clone(),
            )),
            None => {
                tracing::debug!("BLOB_STORAGE_URL not set, media uploads disabled");
                Arc::new(DisabledBlobStore)
            }
        };
        Ok(Self {
            transport,
            storage: Arc::new(storage),
            shell: Arc::new(TracingShell),
            push: Arc::new(HeadlessPlatform::new()),
            blob,
        })
    }
}

/// Shared app state, built once and handed to the UI layer.
pub struct AppState {
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
    pub auth: Arc<AuthSession>,
    pub gallery: Arc<GalleryResource>,
    pub calendar: Arc<CalendarResource>,
    pub schools: Arc<SchoolsResource>,
    pub notifications: Arc<NotificationRegistry>,
}

impl AppState {
    pub fn new(config: Config, platform: Platform) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let session = Arc::new(SessionStore::new(platform.storage.clone()));
        let guard = UnauthorizedHandler::new(session.clone(), platform.shell.clone(), metrics.clone());
        let api = ApiClient::new(
            platform.transport,
            config.api_root(),
            guard,
            metrics.clone(),
            config.connectivity_timeout,
        );

        let auth = Arc::new(AuthSession::new(api.clone(), session.clone(), platform.shell));
        let gallery = Arc::new(GalleryResource::new(
            api.clone(),
            session.clone(),
            platform.blob,
            config.upload_timeout,
        ));
        let calendar = Arc::new(CalendarResource::new(api.clone(), session.clone()));
        let schools = Arc::new(SchoolsResource::new(api.clone(), session.clone()));
        let notifications = Arc::new(NotificationRegistry::new(
            platform.push,
            api.clone(),
            platform.storage,
            config.push_project_id.clone(),
            config.device_type.clone(),
        ));

        Ok(Self {
            config,
            metrics,
            session,
            api,
            auth,
            gallery,
            calendar,
            schools,
            notifications,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.push_max_retries,
            delay: self.config.push_retry_delay,
        }
    }

    /// Start the session watchers of every resource and the push
    /// registration loop. The tasks keep the resources alive and run until
    /// the caller aborts the returned handles.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let orchestrator = RegistrationOrchestrator::new(
            self.notifications.clone(),
            self.retry_policy(),
            self.metrics.clone(),
        );
        vec![
            self.gallery.watch_session(),
            self.calendar.watch_session(),
            self.schools.watch_session(),
            tokio::spawn(orchestrator.run(self.session.subscribe())),
        ]
    }
}
