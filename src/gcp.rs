//! Access tokens for Google Cloud REST APIs.

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the metadata server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

pub struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Where OAuth bearer tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// Fixed token, typically from `GOOGLE_OAUTH_ACCESS_TOKEN`.
    Static(String),
    /// The instance metadata server of the runtime environment. Clones share
    /// the last token until it nears expiry.
    Metadata {
        url: String,
        cached: Arc<Mutex<Option<CachedToken>>>,
    },
    /// Local emulators accept any bearer value.
    Emulator,
}

impl TokenSource {
    pub fn from_config(access_token: Option<&str>) -> Self {
        match access_token {
            Some(token) => TokenSource::Static(token.to_string()),
            None => TokenSource::metadata(METADATA_TOKEN_URL),
        }
    }

    pub fn metadata(url: &str) -> Self {
        TokenSource::Metadata {
            url: url.to_string(),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn token(&self, client: &Client) -> Result<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Emulator => Ok("owner".to_string()),
            TokenSource::Metadata { url, cached } => {
                // held across the fetch so concurrent callers wait for one refresh
                let mut cached = cached.lock().await;
                if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
                    return Ok(token.value.clone());
                }

                let res = client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| AppError::Auth(format!("metadata server unreachable: {}", e)))?;

                if !res.status().is_success() {
                    return Err(AppError::Auth(format!("metadata server returned {}", res.status())));
                }

                let token: MetadataToken = res
                    .json()
                    .await
                    .map_err(|e| AppError::Auth(format!("invalid metadata token response: {}", e)))?;

                let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
                *cached = Some(CachedToken {
                    value: token.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                Ok(token.access_token)
            }
        }
    }
}
