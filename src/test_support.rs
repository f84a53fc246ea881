//! Fakes and fixtures shared by the in-crate tests.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::{
    config::Config,
    db::MemoryStore,
    error::ClientError,
    models::{
        notification::{NotificationChannel, NotificationContent, PermissionStatus, Trigger},
        user::{Credentials, UserProfile},
    },
    routes::Route,
    services::{
        blob::BlobStore,
        push::PushPlatform,
        shell::AppShell,
        transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError},
    },
    state::{AppState, Platform},
};

pub fn user(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        full_name: format!("User {id}"),
        email: format!("{id}@example.com"),
        photo_url: None,
        birthdate: None,
        address: None,
        family_id: Some("fam-1".into()),
        is_verified: true,
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, String),
    Fail,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply::Json(status, body)
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Reply::Raw(status, body.to_string())
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

#[derive(Default)]
struct Script {
    /// Answer every matching request.
    fixed: HashMap<(String, String), Reply>,
    /// Answered once each, in order, before `fixed`.
    queued: HashMap<(String, String), VecDeque<Reply>>,
    requests: Vec<HttpRequest>,
}

/// Transport answering from a script keyed by method and path suffix. The
/// longest matching suffix wins.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: Method, path: &str, reply: Reply) {
        let mut script = self.script.lock().unwrap();
        script.fixed.insert((method.to_string(), path.to_string()), reply);
    }

    pub fn then(&self, method: Method, path: &str, reply: Reply) {
        let mut script = self.script.lock().unwrap();
        script
            .queued
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    fn reply_for(&self, request: &HttpRequest) -> Option<Reply> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());

        let path = request.url.split('?').next().unwrap_or_default();
        let method = request.method.to_string();

        let queued = script
            .queued
            .iter()
            .filter(|(_, replies)| !replies.is_empty())
            .map(|(key, _)| key);
        if let Some(key) = best_match(queued, &method, path) {
            return script.queued.get_mut(&key).and_then(VecDeque::pop_front);
        }
        let key = best_match(script.fixed.keys(), &method, path)?;
        script.fixed.get(&key).cloned()
    }
}

fn best_match<'a>(
    keys: impl Iterator<Item = &'a (String, String)>,
    method: &str,
    path: &str,
) -> Option<(String, String)> {
    keys.filter(|(m, p)| m == method && path.ends_with(p.as_str()))
        .max_by_key(|(_, p)| p.len())
        .cloned()
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let Some(mut reply) = self.reply_for(&request) else {
            return Err(TransportError(format!(
                "no scripted reply for {} {}",
                request.method, request.url
            )));
        };
        loop {
            match reply {
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Json(status, body) => {
                    return Ok(HttpResponse {
                        status,
                        body: Bytes::from(body.to_string()),
                    })
                }
                Reply::Raw(status, body) => {
                    return Ok(HttpResponse {
                        status,
                        body: Bytes::from(body),
                    })
                }
                Reply::Fail => return Err(TransportError("connection refused".into())),
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingShell {
    navigations: Mutex<Vec<Route>>,
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingShell {
    pub fn navigations(&self) -> Vec<Route> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn alert_titles(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }
}

impl AppShell for RecordingShell {
    fn navigate(&self, route: Route) {
        self.navigations.lock().unwrap().push(route);
    }

    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Behaves like a simulator until `grant` is called.
#[derive(Default)]
pub struct FakePush {
    token: Mutex<Option<String>>,
    channels: Mutex<Vec<&'static str>>,
    scheduled: Mutex<Vec<(String, NotificationContent, Trigger)>>,
}

impl FakePush {
    /// Physical device with permission granted and `token` as push token.
    pub fn grant(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }

    pub fn channels_created(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn scheduled(&self) -> Vec<(NotificationContent, Trigger)> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, content, trigger)| (content.clone(), *trigger))
            .collect()
    }
}

#[async_trait]
impl PushPlatform for FakePush {
    fn is_physical_device(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    fn supports_channels(&self) -> bool {
        true
    }

    async fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Undetermined
    }

    async fn request_permission(&self) -> PermissionStatus {
        if self.is_physical_device() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn push_token(&self, _project_id: &str) -> Result<String, ClientError> {
        self.token
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::InvalidInput("no device".into()))
    }

    async fn create_channel(&self, channel: &NotificationChannel) -> Result<(), ClientError> {
        self.channels.lock().unwrap().push(channel.id);
        Ok(())
    }

    async fn schedule(
        &self,
        content: &NotificationContent,
        trigger: Trigger,
    ) -> Result<String, ClientError> {
        let mut scheduled = self.scheduled.lock().unwrap();
        let id = format!("n{}", scheduled.len() + 1);
        scheduled.push((id.clone(), content.clone(), trigger));
        Ok(id)
    }

    async fn cancel(&self, id: &str) -> Result<(), ClientError> {
        self.scheduled.lock().unwrap().retain(|(existing, _, _)| existing != id);
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), ClientError> {
        self.scheduled.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBlob {
    uploads: Mutex<Vec<(String, String)>>,
    deletes: Mutex<Vec<String>>,
    fail_deletes: AtomicBool,
}

impl FakeBlob {
    /// `(key, content_type)` of every upload.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FakeBlob {
    async fn upload(
        &self,
        key: &str,
        _bytes: Bytes,
        content_type: &str,
        _timeout: Duration,
    ) -> Result<String, ClientError> {
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        Ok(format!("https://blob.test/{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.deletes.lock().unwrap().push(key.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ClientError::Blob("bucket unavailable".into()));
        }
        Ok(())
    }
}

/// A full `AppState` over fakes. Derefs to the state.
pub struct Fixture {
    pub app: AppState,
    pub transport: Arc<ScriptedTransport>,
    pub storage: Arc<MemoryStore>,
    pub shell: Arc<RecordingShell>,
    pub push: Arc<FakePush>,
    pub blob: Arc<FakeBlob>,
}

impl Fixture {
    pub async fn with_storage(storage: Arc<MemoryStore>) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let shell = Arc::new(RecordingShell::default());
        let push = Arc::new(FakePush::default());
        let blob = Arc::new(FakeBlob::default());

        let mut config = Config::for_base_url("https://api.test");
        config.push_project_id = Some("project-1".into());
        let app = AppState::new(
            config,
            Platform {
                transport: transport.clone(),
                storage: storage.clone(),
                shell: shell.clone(),
                push: push.clone(),
                blob: blob.clone(),
            },
        )
        .expect("app state");

        Self {
            app,
            transport,
            storage,
            shell,
            push,
            blob,
        }
    }

    pub async fn signed_out() -> Self {
        Self::with_storage(Arc::new(MemoryStore::new())).await
    }

    /// Session for `user("u1")` with token `tok`.
    pub async fn signed_in() -> Self {
        let fx = Self::signed_out().await;
        fx.session
            .establish(Credentials {
                user: user("u1"),
                token: "tok".into(),
            })
            .await
            .expect("session");
        fx
    }
}

impl Deref for Fixture {
    type Target = AppState;

    fn deref(&self) -> &AppState {
        &self.app
    }
}
