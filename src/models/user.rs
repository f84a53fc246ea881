use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

impl UserProfile {
    /// Shallow merge: every top-level field present in `patch` overwrites the
    /// current value, everything else is kept.
    pub fn merged_with(&self, patch: &Map<String, Value>) -> Result<UserProfile, ClientError> {
        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        Ok(serde_json::from_value(Value::Object(current))?)
    }
}

/// The `{ user, token }` pair returned by login and signup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub user: UserProfile,
    pub token: String,
}

// Request DTOs
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

/// Partial profile edit. Unset fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Extract the user object from a profile-update payload. Older servers nest
/// it as `data.user`, newer ones return it as `data`.
pub fn profile_fields(data: Value) -> Result<Map<String, Value>, ClientError> {
    match data {
        Value::Object(mut map) => match map.remove("user") {
            Some(Value::Object(user)) => Ok(user),
            Some(_) => Err(ClientError::InvalidResponse),
            None => Ok(map),
        },
        _ => Err(ClientError::InvalidResponse),
    }
}
