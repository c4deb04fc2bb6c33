use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::AppState;

const PRUNE_THRESHOLD: usize = 10_000;
const MAX_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

struct Windows {
    by_client: HashMap<String, Window>,
    last_prune: Option<Instant>,
}

/// Fixed-window request ceiling per client key.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                by_client: HashMap::new(),
                last_prune: None,
            }),
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now()).await
    }

    async fn allow_at(&self, key: &str, now: Instant) -> bool {
        let window_len = self.config.window;
        let mut windows = self.windows.lock().await;

        // expired entries are swept at most once per window
        let prune_due = windows
            .last_prune
            .is_none_or(|at| now.duration_since(at) >= window_len);
        if windows.by_client.len() > PRUNE_THRESHOLD && prune_due {
            windows.by_client.retain(|_, w| now.duration_since(w.started) < window_len);
            windows.last_prune = Some(now);
        }

        let window = windows
            .by_client
            .entry(key.to_string())
            .or_insert(Window { started: now, hits: 0 });
        if now.duration_since(window.started) >= window_len {
            *window = Window { started: now, hits: 0 };
        }

        if window.hits >= self.config.max_requests {
            return false;
        }
        window.hits += 1;
        true
    }

    /// Client identity: the peer address, or the `X-Forwarded-For` entry
    /// written by the outermost trusted proxy when proxies are configured.
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        forwarded_client(headers, self.config.trusted_proxy_hops)
            .or_else(|| peer.map(|p| p.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.by_client.len()
    }
}

/// Each trusted proxy appends the address it saw, so the client is
/// `hops` entries from the right; anything further left is caller-supplied.
fn forwarded_client(headers: &HeaderMap, hops: usize) -> Option<String> {
    if hops == 0 {
        return None;
    }

    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let entries: Vec<&str> = raw.split(',').map(str::trim).collect();
    let candidate = *entries.len().checked_sub(hops).and_then(|i| entries.get(i))?;

    if candidate.is_empty() || candidate.len() > MAX_KEY_LEN {
        return None;
    }
    if candidate
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':' || b == b'-')
    {
        Some(candidate.to_string())
    } else {
        None
    }
}

pub async fn rate_limit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let key = state
        .limiter
        .client_key(request.headers(), connect_info.map(|ConnectInfo(addr)| addr));

    if !state.limiter.allow(&key).await {
        tracing::warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}
