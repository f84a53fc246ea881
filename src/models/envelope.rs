use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, INVALID_RESPONSE_FORMAT, NETWORK_ERROR};

/// Exact literal the backend uses to signal a dead session.
pub const UNAUTHORIZED_SENTINEL: &str = "Unauthorized, Token Failed";

/// Structured error code carried next to `error`/`message` by newer servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Validation,
    #[serde(other)]
    Other,
}

/// Where an envelope came from. Synthetic envelopes never reached the server
/// or could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrigin {
    #[default]
    Server,
    Transport,
    Malformed,
    SessionExpired,
}

/// `{ success, data?, message?, error?, errorKind? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T = Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip)]
    pub status: u16,
    #[serde(skip)]
    pub origin: ResponseOrigin,
}

impl ApiResponse<Value> {
    fn synthetic(origin: ResponseOrigin, error: &str) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.to_string()),
            error_kind: None,
            status: 0,
            origin,
        }
    }

    pub fn network_error() -> Self {
        Self::synthetic(ResponseOrigin::Transport, NETWORK_ERROR)
    }

    pub fn invalid_format(status: u16) -> Self {
        Self {
            status,
            ..Self::synthetic(ResponseOrigin::Malformed, INVALID_RESPONSE_FORMAT)
        }
    }

    pub fn session_expired(status: u16) -> Self {
        Self {
            status,
            error_kind: Some(ErrorKind::Unauthorized),
            ..Self::synthetic(ResponseOrigin::SessionExpired, "Unauthorized")
        }
    }

    /// Parse a raw body. A non-2xx status always yields `success == false`.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ApiResponse<Value>>(body) {
            Ok(mut parsed) => {
                parsed.status = status;
                if !(200..300).contains(&status) {
                    parsed.success = false;
                }
                parsed
            }
            Err(_) => Self::invalid_format(status),
        }
    }

    /// True when the body carries the session-invalidation signal, either as
    /// a structured kind or as the legacy literal.
    pub fn is_unauthorized(&self) -> bool {
        self.error_kind == Some(ErrorKind::Unauthorized)
            || self.error.as_deref() == Some(UNAUTHORIZED_SENTINEL)
            || self.message.as_deref() == Some(UNAUTHORIZED_SENTINEL)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.error_kind == Some(ErrorKind::NotFound)
    }

    /// Best human-readable failure text, `error` first.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "Request failed".to_string())
    }

    fn failure(&self) -> ClientError {
        match self.origin {
            ResponseOrigin::Transport => ClientError::Network,
            ResponseOrigin::Malformed => ClientError::InvalidResponse,
            ResponseOrigin::SessionExpired => ClientError::Unauthorized,
            ResponseOrigin::Server if self.is_unauthorized() => ClientError::Unauthorized,
            ResponseOrigin::Server => ClientError::Api {
                status: self.status,
                message: self.failure_message(),
            },
        }
    }

    /// Success without caring about the payload (deletes, acknowledgements).
    pub fn ensure_success(&self) -> Result<(), ClientError> {
        if self.success {
            Ok(())
        } else {
            Err(self.failure())
        }
    }

    /// Decode `data` into `T`. A successful envelope without `data` decodes
    /// from `null`, so `Option<_>` payloads are fine.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        self.ensure_success()?;
        let data = self.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|err| {
            tracing::warn!("Unexpected payload shape: {}", err);
            ClientError::InvalidResponse
        })
    }
}
