use std::sync::Arc;

use tracing::warn;

use crate::{
    models::envelope::ApiResponse,
    routes::Route,
    services::{metrics::Metrics, session::SessionStore, shell::AppShell},
};

pub const SESSION_EXPIRED_TITLE: &str = "Session Expired";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// The single place a rejected token tears the session down. Every
/// authenticated response passes through here, so storage, memory and
/// navigation never diverge.
#[derive(Clone)]
pub struct UnauthorizedHandler {
    session: Arc<SessionStore>,
    shell: Arc<dyn AppShell>,
    metrics: Arc<Metrics>,
}

impl UnauthorizedHandler {
    pub fn new(session: Arc<SessionStore>, shell: Arc<dyn AppShell>, metrics: Arc<Metrics>) -> Self {
        Self {
            session,
            shell,
            metrics,
        }
    }

    /// Returns true (after invalidating the session) when `response` carries
    /// the unauthorized signal.
    pub async fn intercept(&self, response: &ApiResponse) -> bool {
        if !response.is_unauthorized() {
            return false;
        }
        self.invalidate().await;
        true
    }

    pub async fn invalidate(&self) {
        warn!("Server rejected the session token, signing out");
        self.session.clear().await;
        self.metrics.session_invalidated();
        self.shell.alert(SESSION_EXPIRED_TITLE, SESSION_EXPIRED_MESSAGE);
        self.shell.navigate(Route::Auth);
    }
}
