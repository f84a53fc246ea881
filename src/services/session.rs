use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::{
    db::{KeyValueStore, SESSION_KEY},
    error::ClientError,
    models::user::{Credentials, UserProfile},
};

/// Who is signed in. `user` and `token` only exist together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    credentials: Option<Credentials>,
}

/// The pair that identifies one signed-in session for push registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.credentials.as_ref().map(|c| Identity {
            user_id: c.user.id.clone(),
            token: c.token.clone(),
        })
    }
}

/// Persisted shape. Both halves are optional here only so that partial or
/// legacy records can be detected and discarded.
#[derive(Debug, Deserialize)]
struct StoredSession {
    user: Option<UserProfile>,
    token: Option<String>,
}

/// The one shared, mutable session. In-memory state is published on a watch
/// channel; every write persists first and then publishes, under a lock.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<Session>,
    writes: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            storage,
            state,
            writes: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token().map(str::to_string)
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Load the persisted session into memory. Partial or unreadable records
    /// are removed and yield `None`.
    pub async fn restore(&self) -> Result<Option<Credentials>, ClientError> {
        let _guard = self.writes.lock().await;
        let Some(raw) = self.storage.get(SESSION_KEY).await? else {
            self.state.send_replace(Session::default());
            return Ok(None);
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(StoredSession {
                user: Some(user),
                token: Some(token),
            }) => {
                let credentials = Credentials { user, token };
                self.state.send_replace(Session::new(credentials.clone()));
                Ok(Some(credentials))
            }
            Ok(_) => {
                warn!("Persisted session is incomplete, discarding it");
                self.discard_locked().await;
                Ok(None)
            }
            Err(e) => {
                warn!("Persisted session is unreadable ({}), discarding it", e);
                self.discard_locked().await;
                Ok(None)
            }
        }
    }

    /// Persist and publish a fresh `{ user, token }` pair.
    pub async fn establish(&self, credentials: Credentials) -> Result<(), ClientError> {
        let _guard = self.writes.lock().await;
        self.persist(&credentials).await?;
        info!("Session started for {}", credentials.user.email);
        self.state.send_replace(Session::new(credentials));
        Ok(())
    }

    /// Rewrite the user record of the session holding `token`. Fails with
    /// `NotAuthenticated` if that session has ended in the meantime.
    pub async fn update_user<F>(&self, token: &str, update: F) -> Result<UserProfile, ClientError>
    where
        F: FnOnce(&UserProfile) -> Result<UserProfile, ClientError>,
    {
        let _guard = self.writes.lock().await;
        let current = self.current();
        let (Some(user), Some(current_token)) = (current.user(), current.token()) else {
            return Err(ClientError::NotAuthenticated);
        };
        if current_token != token {
            warn!("Session changed while a profile update was in flight, dropping it");
            return Err(ClientError::NotAuthenticated);
        }

        let user = update(user)?;
        let credentials = Credentials {
            user: user.clone(),
            token: token.to_string(),
        };
        self.persist(&credentials).await?;
        self.state.send_replace(Session::new(credentials));
        Ok(user)
    }

    /// Drop the session from storage and memory. Storage failures are logged;
    /// memory is always cleared.
    pub async fn clear(&self) {
        let _guard = self.writes.lock().await;
        self.discard_locked().await;
    }

    async fn discard_locked(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY).await {
            warn!("Failed to remove persisted session: {}", e);
        }
        self.state.send_replace(Session::default());
    }

    async fn persist(&self, credentials: &Credentials) -> Result<(), ClientError> {
        let raw =
            serde_json::to_string(credentials).map_err(|e| ClientError::Storage(e.to_string()))?;
        self.storage.set(SESSION_KEY, &raw).await
    }
}
