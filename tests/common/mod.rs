#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Days, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

use release_notes_dashboard::config::Config;
use release_notes_dashboard::counter::MemoryCounterStore;
use release_notes_dashboard::error::{AppError, Result};
use release_notes_dashboard::llm::SummaryGenerator;
use release_notes_dashboard::warehouse::{DateRange, ReleaseNote, ReleaseNoteFilter, ReleaseNoteStore};
use release_notes_dashboard::AppState;

/// In-memory stand-in for the warehouse that applies the same predicates.
#[derive(Default)]
pub struct FakeNotes {
    pub notes: Vec<ReleaseNote>,
    pub fail_with: Option<String>,
    pub queries: AtomicUsize,
}

#[async_trait]
impl ReleaseNoteStore for FakeNotes {
    async fn release_notes(&self, filter: &ReleaseNoteFilter, range: DateRange) -> Result<Vec<ReleaseNote>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail_with {
            return Err(AppError::Warehouse(msg.clone()));
        }
        let mut notes: Vec<ReleaseNote> = self
            .notes
            .iter()
            .filter(|n| range.contains(n.published_at) && filter.matches(n))
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(notes)
    }

    async fn products(&self) -> Result<Vec<String>> {
        let mut products: Vec<String> = self.notes.iter().map(|n| n.product_name.clone()).collect();
        products.sort();
        products.dedup();
        Ok(products)
    }

    async fn types(&self) -> Result<Vec<String>> {
        let mut types: Vec<String> = self.notes.iter().map(|n| n.release_note_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }
}

pub fn days_ago(days: u64) -> NaiveDate {
    Utc::now().date_naive() - Days::new(days)
}

pub fn note(product: &str, kind: &str, days: u64) -> ReleaseNote {
    ReleaseNote {
        product_name: product.to_string(),
        release_note_type: kind.to_string(),
        description: format!("{} {} change", product, kind),
        published_at: days_ago(days),
    }
}

pub fn sample_notes() -> Vec<ReleaseNote> {
    vec![
        note("BigQuery", "FEATURE", 1),
        note("BigQuery", "FIX", 2),
        note("Cloud Run", "FEATURE", 1),
        note("BigQuery", "FEATURE", 3),
        note("BigQuery", "FEATURE", 20),
        note("Spanner", "SERVICE_ANNOUNCEMENT", 60),
    ]
}

pub struct TestApp {
    pub router: Router,
    pub static_dir: TempDir,
}

impl TestApp {
    pub fn build(vars: &[(&str, &str)], notes: FakeNotes) -> Self {
        Self::build_with(vars, notes, |_| {})
    }

    pub fn build_with<F: FnOnce(&mut Config)>(vars: &[(&str, &str)], notes: FakeNotes, adjust: F) -> Self {
        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("index.html"), "<html>dashboard</html>").unwrap();
        std::fs::write(static_dir.path().join("app.js"), "console.log('app');").unwrap();

        let mut env: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        env.entry("APP_ENV".into()).or_insert_with(|| "test".into());
        env.insert("STATIC_DIR".into(), static_dir.path().display().to_string());

        let mut config = Config::from_lookup(|key| env.get(key).cloned()).unwrap();
        adjust(&mut config);

        let summarizer = SummaryGenerator::from_config(&config.gemini).unwrap();
        let state = AppState::new(config, Arc::new(notes), Arc::new(MemoryCounterStore::new()), summarizer);

        Self {
            router: release_notes_dashboard::api::routes::create_router(state),
            static_dir,
        }
    }

    pub async fn request(&self, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        self.request_from(method, uri, None, &[]).await
    }

    /// Sends a request as if it arrived over a socket from `peer`.
    pub async fn request_from(
        &self,
        method: &str,
        uri: &str,
        peer: Option<SocketAddr>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(addr) = peer {
            request.extensions_mut().insert(ConnectInfo(addr));
        }

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.request("GET", uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    pub async fn post_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.request("POST", uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}
