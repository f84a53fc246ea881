use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::ClientError,
    middleware::UnauthorizedHandler,
    models::envelope::{ApiResponse, ResponseOrigin},
    routes::api,
    services::{
        metrics::Metrics,
        transport::{Body, HttpRequest, HttpTransport, Method},
    },
};

/// One call against the REST API, relative to the API root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        let value =
            serde_json::to_value(body).map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, params: Vec<(String, String)>) -> Self {
        self.query.extend(params);
        self
    }
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    root: String,
    guard: UnauthorizedHandler,
    metrics: Arc<Metrics>,
    connectivity_timeout: Duration,
}

/// Envelope-aware REST client. Never fails: every outcome, including transport
/// errors and unreadable bodies, comes back as an `ApiResponse`.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        root: impl Into<String>,
        guard: UnauthorizedHandler,
        metrics: Arc<Metrics>,
        connectivity_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                root: root.into(),
                guard,
                metrics,
                connectivity_timeout,
            }),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.root, path)
    }

    /// Unauthenticated call (login, signup, password reset). No session
    /// handling.
    pub async fn call(&self, request: ApiRequest) -> ApiResponse {
        let response = self.execute(request, None).await;
        self.record(&response);
        response
    }

    /// Bearer-authenticated call. An unauthorized body tears the session down
    /// through the shared handler and comes back as a terminal
    /// `{ success: false, error: "Unauthorized" }`.
    pub async fn authenticated_call(&self, request: ApiRequest, token: &str) -> ApiResponse {
        let response = self.execute(request, Some(token)).await;
        if response.origin == ResponseOrigin::Server
            && self.inner.guard.intercept(&response).await
        {
            self.inner.metrics.api_request("unauthorized");
            return ApiResponse::session_expired(response.status);
        }
        self.record(&response);
        response
    }

    /// `GET /health` raced against the connectivity timeout.
    pub async fn check_connectivity(&self) -> bool {
        let health = self.call(ApiRequest::get(api::HEALTH));
        match tokio::time::timeout(self.inner.connectivity_timeout, health).await {
            Ok(response) => {
                response.origin != ResponseOrigin::Transport
                    && (200..300).contains(&response.status)
            }
            Err(_) => {
                warn!("Connectivity check timed out");
                false
            }
        }
    }

    async fn execute(&self, request: ApiRequest, token: Option<&str>) -> ApiResponse {
        let method = request.method;
        let path = request.path.clone();
        let http = match self.build(request, token) {
            Ok(http) => http,
            Err(e) => {
                warn!("{} {}: could not build request: {}", method, path, e);
                return ApiResponse::network_error();
            }
        };

        match self.inner.transport.send(http).await {
            Ok(raw) => {
                debug!("{} {} -> {}", method, path, raw.status);
                let response = ApiResponse::from_body(raw.status, &raw.body);
                if response.origin == ResponseOrigin::Malformed {
                    warn!("{} {}: response body is not JSON", method, path);
                }
                response
            }
            Err(e) => {
                warn!("{} {} failed: {}", method, path, e);
                ApiResponse::network_error()
            }
        }
    }

    fn build(&self, request: ApiRequest, token: Option<&str>) -> Result<HttpRequest, ClientError> {
        let url = self.url(&request.path);
        let url = if request.query.is_empty() {
            url
        } else {
            reqwest::Url::parse_with_params(&url, &request.query)
                .map_err(|e| ClientError::InvalidInput(e.to_string()))?
                .to_string()
        };

        let mut http = HttpRequest::new(request.method, url)
            .header("Accept", mime::APPLICATION_JSON.as_ref());
        if let Some(token) = token {
            http = http.bearer(token);
        }
        http.body = request.body.map(Body::Json);
        Ok(http)
    }

    fn record(&self, response: &ApiResponse) {
        let outcome = match response.origin {
            ResponseOrigin::Transport => "network_error",
            ResponseOrigin::Malformed => "invalid_response",
            ResponseOrigin::SessionExpired => "unauthorized",
            ResponseOrigin::Server if response.success => "ok",
            ResponseOrigin::Server => "business_error",
        };
        self.inner.metrics.api_request(outcome);
    }
}
