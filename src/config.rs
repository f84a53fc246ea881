use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_prefix: String,
    pub data_dir: String,
    pub push_project_id: Option<String>,
    pub blob_storage_url: Option<String>,
    pub blob_bucket: String,
    pub blob_api_key: Option<String>,
    /// Reported to the backend with the push token: "android" | "ios" | "web"
    pub device_type: String,
    pub connectivity_timeout: Duration,
    pub upload_timeout: Duration,
    pub push_max_retries: u32,
    pub push_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_base_url: required("API_BASE_URL")?.trim_end_matches('/').to_string(),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".into()),
            data_dir: env::var("FAMSYNC_DATA_DIR").unwrap_or_else(|_| ".famsync".into()),
            push_project_id: env::var("PUSH_PROJECT_ID").ok().filter(|s| !s.is_empty()),
            blob_storage_url: env::var("BLOB_STORAGE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string()),
            blob_bucket: env::var("BLOB_BUCKET").unwrap_or_else(|_| "family-media".into()),
            blob_api_key: env::var("BLOB_API_KEY").ok().filter(|s| !s.is_empty()),
            device_type: env::var("DEVICE_TYPE").unwrap_or_else(|_| "android".into()),
            connectivity_timeout: Duration::from_secs(
                env::var("CONNECTIVITY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".into())
                    .parse()?,
            ),
            upload_timeout: Duration::from_secs(
                env::var("UPLOAD_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".into())
                    .parse()?,
            ),
            push_max_retries: env::var("PUSH_MAX_RETRIES")
                .unwrap_or_else(|_| "3".into())
                .parse()?,
            push_retry_delay: Duration::from_millis(
                env::var("PUSH_RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "5000".into())
                    .parse()?,
            ),
        })
    }

    /// Config pointing at `base_url` with every optional knob at its default.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            api_base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: "/api/v1".into(),
            data_dir: ".famsync".into(),
            push_project_id: None,
            blob_storage_url: None,
            blob_bucket: "family-media".into(),
            blob_api_key: None,
            device_type: "android".into(),
            connectivity_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(30),
            push_max_retries: 3,
            push_retry_delay: Duration::from_secs(5),
        }
    }

    /// `https://host` + `/api/v1`
    pub fn api_root(&self) -> String {
        format!("{}{}", self.api_base_url, self.api_prefix)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
