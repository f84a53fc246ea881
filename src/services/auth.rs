use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    error::ClientError,
    models::user::{
        profile_fields, Credentials, ForgotPasswordRequest, LoginRequest, ProfileUpdate,
        SignupRequest, UserProfile,
    },
    routes::{api, Route},
    services::{
        api::{ApiClient, ApiRequest},
        session::{Session, SessionStore},
        shell::AppShell,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Startup check has not completed yet.
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Sign-in flows on top of the shared session.
pub struct AuthSession {
    api: ApiClient,
    session: Arc<SessionStore>,
    shell: Arc<dyn AppShell>,
    checked: AtomicBool,
}

impl AuthSession {
    pub fn new(api: ApiClient, session: Arc<SessionStore>, shell: Arc<dyn AppShell>) -> Self {
        Self {
            api,
            session,
            shell,
            checked: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> AuthStatus {
        if !self.checked.load(Ordering::SeqCst) {
            return AuthStatus::Unknown;
        }
        if self.session.current().is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session.user()
    }

    pub fn token(&self) -> Option<String> {
        self.session.token()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Restore the persisted session and route accordingly. Runs once per
    /// process; later calls only report the current status.
    pub async fn check_auth_status(&self) -> AuthStatus {
        if self.checked.swap(true, Ordering::SeqCst) {
            return self.status();
        }

        match self.session.restore().await {
            Ok(Some(credentials)) => {
                info!("Restored session for {}", credentials.user.email);
                self.shell.navigate(Route::Main);
            }
            Ok(None) => self.shell.navigate(Route::Auth),
            Err(e) => {
                warn!("Auth: failed to restore session: {}", e);
                self.session.clear().await;
                self.shell.navigate(Route::Auth);
            }
        }
        self.status()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<bool, ClientError> {
        let request = ApiRequest::post(api::LOGIN).json(&LoginRequest { email, password })?;
        let credentials: Credentials = self.api.call(request).await.into_data()?;
        self.start(credentials).await?;
        Ok(true)
    }

    pub async fn signup(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, ClientError> {
        let request = ApiRequest::post(api::SIGNUP).json(&SignupRequest {
            full_name,
            email,
            password,
        })?;
        let credentials: Credentials = self.api.call(request).await.into_data()?;
        self.start(credentials).await?;
        Ok(true)
    }

    pub async fn forgot_password(&self, email: &str) -> Result<bool, ClientError> {
        let request = ApiRequest::post(api::FORGOT_PASSWORD).json(&ForgotPasswordRequest { email })?;
        self.api.call(request).await.ensure_success()?;
        Ok(true)
    }

    /// Send a partial profile edit and merge whatever the server echoes back
    /// into the stored user.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        let request = ApiRequest::put(api::PROFILE).json(&update)?;
        let data: serde_json::Value = self
            .api
            .authenticated_call(request, &token)
            .await
            .into_data()?;
        let fields = profile_fields(data)?;

        self.session
            .update_user(&token, |current| current.merged_with(&fields))
            .await
    }

    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let token = self.session.token().ok_or(ClientError::NotAuthenticated)?;
        self.api
            .authenticated_call(ApiRequest::delete(api::ACCOUNT), &token)
            .await
            .ensure_success()?;
        info!("Account deleted");
        self.session.clear().await;
        self.shell.navigate(Route::Auth);
        Ok(())
    }

    pub async fn logout(&self) {
        self.session.clear().await;
        self.shell.navigate(Route::Auth);
    }

    async fn start(&self, credentials: Credentials) -> Result<(), ClientError> {
        self.session.establish(credentials).await?;
        self.checked.store(true, Ordering::SeqCst);
        self.shell.navigate(Route::Main);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, SESSION_KEY};
    use crate::services::transport::Method;
    use crate::test_support::{user, Fixture, Reply};
    use serde_json::json;
    use std::time::Duration;

    fn credentials_body() -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "user": { "id": "u1", "fullName": "Alice Martin", "email": "alice@example.com" },
                "token": "tok-1"
            }
        })
    }

    #[tokio::test]
    async fn login_establishes_session_and_navigates() {
        let fx = Fixture::signed_out().await;
        fx.transport.on(Method::Post, "/auth/login", Reply::json(200, credentials_body()));

        assert_eq!(fx.auth.login("alice@example.com", "secret").await, Ok(true));
        assert_eq!(fx.auth.token().as_deref(), Some("tok-1"));
        assert_eq!(fx.auth.status(), AuthStatus::Authenticated);
        assert_eq!(fx.shell.navigations(), vec![Route::Main]);
        assert!(fx.storage.get(SESSION_KEY).await.unwrap().is_some());

        let sent = fx.transport.requests();
        assert_eq!(sent[0].header_value("authorization"), None);
    }

    #[tokio::test]
    async fn failed_login_surfaces_server_message() {
        let fx = Fixture::signed_out().await;
        fx.transport.on(
            Method::Post,
            "/auth/login",
            Reply::json(401, json!({ "success": false, "error": "Invalid credentials" })),
        );

        let err = fx.auth.login("alice@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert!(!fx.session.current().is_authenticated());
        assert!(fx.shell.navigations().is_empty());
    }

    #[tokio::test]
    async fn check_auth_status_runs_once() {
        let fx = Fixture::signed_out().await;
        fx.storage
            .set(
                SESSION_KEY,
                &serde_json::to_string(&Credentials { user: user("u1"), token: "t".into() }).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(fx.auth.status(), AuthStatus::Unknown);
        assert_eq!(fx.auth.check_auth_status().await, AuthStatus::Authenticated);
        assert_eq!(fx.auth.check_auth_status().await, AuthStatus::Authenticated);
        assert_eq!(fx.shell.navigations(), vec![Route::Main]);
    }

    #[tokio::test]
    async fn update_profile_merges_nested_user() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Put,
            "/auth/profile",
            Reply::json(200, json!({ "success": true, "data": { "user": { "address": "1 Main St" } } })),
        );

        let updated = fx
            .auth
            .update_profile(ProfileUpdate {
                address: Some("1 Main St".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.address.as_deref(), Some("1 Main St"));
        assert_eq!(updated.email, user("u1").email);
        assert_eq!(fx.auth.current_user(), Some(updated));
        assert_eq!(fx.auth.token().as_deref(), Some("tok"));

        let sent = fx.transport.requests();
        assert_eq!(sent[0].body, Some(crate::services::transport::Body::Json(json!({ "address": "1 Main St" }))));
    }

    #[tokio::test]
    async fn update_profile_is_dropped_if_another_account_signed_in_meanwhile() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Put,
            "/auth/profile",
            Reply::delayed(
                Duration::from_millis(50),
                Reply::json(200, json!({ "success": true, "data": { "fullName": "Alice Renamed" } })),
            ),
        );

        let auth = Arc::clone(&fx.auth);
        let pending = tokio::spawn(async move {
            auth.update_profile(ProfileUpdate {
                full_name: Some("Alice Renamed".into()),
                ..Default::default()
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.auth.logout().await;
        fx.session
            .establish(Credentials { user: user("u2"), token: "tok-b".into() })
            .await
            .unwrap();

        assert_eq!(pending.await.unwrap(), Err(ClientError::NotAuthenticated));
        assert_eq!(fx.auth.current_user(), Some(user("u2")));
        assert_eq!(fx.auth.token().as_deref(), Some("tok-b"));
    }

    #[tokio::test]
    async fn signup_establishes_session() {
        let fx = Fixture::signed_out().await;
        fx.transport.on(Method::Post, "/auth/signup", Reply::json(201, credentials_body()));

        assert_eq!(
            fx.auth.signup("Alice Martin", "alice@example.com", "secret").await,
            Ok(true)
        );
        assert_eq!(fx.auth.status(), AuthStatus::Authenticated);
        assert_eq!(fx.auth.token().as_deref(), Some("tok-1"));
        assert_eq!(fx.shell.navigations(), vec![Route::Main]);

        let sent = fx.transport.requests();
        assert_eq!(
            sent[0].body,
            Some(crate::services::transport::Body::Json(json!({
                "fullName": "Alice Martin",
                "email": "alice@example.com",
                "password": "secret"
            })))
        );
    }

    #[tokio::test]
    async fn failed_signup_keeps_existing_session() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Post,
            "/auth/signup",
            Reply::json(409, json!({ "success": false, "error": "Email already registered" })),
        );

        let err = fx
            .auth
            .signup("Alice Martin", "alice@example.com", "secret")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(fx.auth.token().as_deref(), Some("tok"));
        assert!(fx.shell.navigations().is_empty());
    }

    #[tokio::test]
    async fn forgot_password_leaves_session_alone() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(
            Method::Post,
            "/auth/forgot-password",
            Reply::json(200, json!({ "success": true, "message": "Reset email sent" })),
        );
        assert_eq!(fx.auth.forgot_password("alice@example.com").await, Ok(true));

        fx.transport.on(
            Method::Post,
            "/auth/forgot-password",
            Reply::json(404, json!({ "success": false, "error": "No account for that email" })),
        );
        let err = fx.auth.forgot_password("nobody@example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "No account for that email");

        assert_eq!(fx.auth.current_user(), Some(user("u1")));
        assert_eq!(fx.auth.token().as_deref(), Some("tok"));
        assert!(fx.shell.navigations().is_empty());
        assert!(fx.transport.requests().iter().all(|r| r.header_value("authorization").is_none()));
    }

    #[tokio::test]
    async fn delete_account_clears_and_routes_to_auth() {
        let fx = Fixture::signed_in().await;
        fx.transport.on(Method::Delete, "/auth/account", Reply::json(200, json!({ "success": true })));

        fx.auth.delete_account().await.unwrap();
        assert_eq!(fx.auth.current_user(), None);
        assert_eq!(fx.shell.navigations(), vec![Route::Auth]);
    }

    #[tokio::test]
    async fn logout_without_session_is_harmless() {
        let fx = Fixture::signed_out().await;
        fx.auth.logout().await;
        assert_eq!(fx.auth.token(), None);
        assert_eq!(fx.shell.navigations(), vec![Route::Auth]);
    }
}
