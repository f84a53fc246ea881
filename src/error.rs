use thiserror::Error;

/// Message shown when the transport never produced a response.
pub const NETWORK_ERROR: &str = "Network error";
/// Message shown when the server answered with something that is not JSON.
pub const INVALID_RESPONSE_FORMAT: &str = "Invalid response format from server";
/// Friendly replacement for transport failures in resource error banners.
pub const CONNECTIVITY_HINT: &str = "Network error. Please check your internet connection.";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    #[error("Network error")]
    Network,

    #[error("Invalid response format from server")]
    InvalidResponse,

    /// Business failure reported by the server, message passed through verbatim.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The session was invalidated by the server. Terminal for the call.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0} notifications are disabled")]
    NotificationsDisabled(&'static str),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl ClientError {
    /// Text suitable for an error banner. Transport failures get the
    /// connectivity hint, everything else is shown as-is.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Network | ClientError::Timeout(_) => CONNECTIVITY_HINT.to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(_: serde_json::Error) -> Self {
        ClientError::InvalidResponse
    }
}
