use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, Result};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
/// Stable model used when an experimental model fails.
pub const FALLBACK_GEMINI_MODEL: &str = "gemini-1.5-flash";

const KNOWN_GEMINI_MODELS: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-1.0-pro",
    "gemini-2.0-flash",
    "gemini-pro",
];

static EXPERIMENTAL_MODEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[-_.])(exp|experimental|preview)([-_.]|\d|$)").expect("Failed to compile model pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    /// Whether clients see underlying error messages.
    pub fn is_verbose(self) -> bool {
        !matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
            Environment::Test => write!(f, "test"),
        }
    }
}

/// Generative model name, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiModel {
    Known(String),
    /// Preview/experimental build; falls back to a stable model on failure.
    Experimental(String),
    /// Not on the known list; passed through as-is.
    Unvalidated(String),
}

impl GeminiModel {
    pub fn resolve(name: &str) -> Self {
        let name = name.trim().to_string();
        let lower = name.to_ascii_lowercase();
        if KNOWN_GEMINI_MODELS.contains(&lower.as_str()) {
            GeminiModel::Known(name)
        } else if EXPERIMENTAL_MODEL.is_match(&name) {
            GeminiModel::Experimental(name)
        } else {
            GeminiModel::Unvalidated(name)
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GeminiModel::Known(name)
            | GeminiModel::Experimental(name)
            | GeminiModel::Unvalidated(name) => name,
        }
    }

    pub fn is_experimental(&self) -> bool {
        matches!(self, GeminiModel::Experimental(_))
    }
}

#[derive(Debug, Clone)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub project_id: Option<String>,
    pub dataset: String,
    pub table: String,
    pub location: String,
    pub api_base: String,
}

impl WarehouseConfig {
    /// Fully-qualified table reference for use inside backticks.
    pub fn table_ref(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: GeminiModel,
    pub endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub project_id: Option<String>,
    pub collection: String,
    pub document: String,
    pub emulator_host: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    /// Proxies in front of the service that append to `X-Forwarded-For`.
    /// Zero means the header is ignored and the peer address is used.
    pub trusted_proxy_hops: usize,
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub environment: Environment,
    pub cors_origins: CorsOrigins,
    pub warehouse: WarehouseConfig,
    pub gemini: GeminiConfig,
    pub counter: CounterConfig,
    pub rate_limit: RateLimitConfig,
    pub static_dir: PathBuf,
    pub access_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT").unwrap_or_else(|| "8080".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::Config(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        let environment = var("APP_ENV")
            .or_else(|| var("NODE_ENV"))
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let cors_origins = parse_cors_origins(
            &var("CORS_ORIGINS").unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string()),
        );

        let bigquery_project = var("BIGQUERY_PROJECT_ID");
        let warehouse = WarehouseConfig {
            project_id: bigquery_project.clone(),
            dataset: var("BIGQUERY_DATASET")
                .unwrap_or_else(|| "bigquery-public-data.google_cloud_release_notes".to_string()),
            table: var("BIGQUERY_TABLE").unwrap_or_else(|| "release_notes".to_string()),
            location: var("BIGQUERY_LOCATION").unwrap_or_else(|| "US".to_string()),
            api_base: var("BIGQUERY_API_BASE")
                .unwrap_or_else(|| "https://bigquery.googleapis.com/bigquery/v2".to_string()),
        };

        let gemini = GeminiConfig {
            api_key: var("GEMINI_API_KEY"),
            model: GeminiModel::resolve(&var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string())),
            endpoint: var("GEMINI_API_ENDPOINT").unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
            timeout: Duration::from_secs(60),
        };

        let counter = CounterConfig {
            project_id: var("FIRESTORE_PROJECT_ID").or(bigquery_project),
            collection: var("FIRESTORE_COLLECTION").unwrap_or_else(|| "visitors".to_string()),
            document: var("FIRESTORE_DOCUMENT").unwrap_or_else(|| "counter".to_string()),
            emulator_host: var("FIRESTORE_EMULATOR_HOST"),
        };

        let window_ms = parse_number::<u64>(var("RATE_LIMIT_WINDOW_MS"), "RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)?;
        let max_requests = parse_number::<u32>(var("RATE_LIMIT_MAX_REQUESTS"), "RATE_LIMIT_MAX_REQUESTS", 100)?;
        let trusted_proxy_hops = parse_number::<usize>(var("TRUSTED_PROXY_HOPS"), "TRUSTED_PROXY_HOPS", 0)?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            environment,
            cors_origins,
            warehouse,
            gemini,
            counter,
            rate_limit: RateLimitConfig {
                window: Duration::from_millis(window_ms),
                max_requests,
                trusted_proxy_hops,
            },
            static_dir: PathBuf::from(var("STATIC_DIR").unwrap_or_else(|| "public".to_string())),
            access_token: var("GOOGLE_OAUTH_ACCESS_TOKEN"),
        })
    }

    /// Emits the resolved configuration and any warnings about it.
    pub fn log_summary(&self) {
        tracing::info!(
            addr = %self.server_addr,
            environment = %self.environment,
            warehouse_table = %self.warehouse.table_ref(),
            warehouse_location = %self.warehouse.location,
            counter_collection = %self.counter.collection,
            rate_limit_window_ms = self.rate_limit.window.as_millis() as u64,
            rate_limit_max = self.rate_limit.max_requests,
            trusted_proxy_hops = self.rate_limit.trusted_proxy_hops,
            static_dir = %self.static_dir.display(),
            "configuration loaded"
        );

        if self.warehouse.project_id.is_none() {
            tracing::warn!("BIGQUERY_PROJECT_ID is not set, release note queries will fail");
        }
        if self.gemini.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set, summaries are disabled");
        }
        match &self.gemini.model {
            GeminiModel::Known(name) => tracing::info!(model = %name, "using generative model"),
            GeminiModel::Experimental(name) => tracing::info!(
                model = %name,
                fallback = FALLBACK_GEMINI_MODEL,
                "using experimental generative model with fallback"
            ),
            GeminiModel::Unvalidated(name) => {
                tracing::warn!(model = %name, "generative model is not on the known list, passing through")
            }
        }
        if self.counter.project_id.is_none() && self.counter.emulator_host.is_none() {
            tracing::warn!("no Firestore project configured, visitor counter is process-local");
        }
    }
}

fn parse_cors_origins(raw: &str) -> CorsOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}

fn parse_number<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match value {
        Some(v) => v.parse::<T>().map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
