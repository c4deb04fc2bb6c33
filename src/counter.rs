//! Site-wide visitor counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::CounterConfig;
use crate::error::{AppError, Result};
use crate::gcp::TokenSource;

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDocument {
    pub count: i64,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically adds one and returns the new count.
    async fn increment(&self) -> Result<i64>;

    /// Current count, 0 if the counter was never incremented.
    async fn get(&self) -> Result<i64>;
}

/// Process-local counter for development and tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    document: Mutex<Option<CounterDocument>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(count: i64) -> Self {
        Self {
            document: Mutex::new(Some(CounterDocument {
                count,
                last_updated: Utc::now(),
            })),
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self) -> Result<i64> {
        let mut doc = self.document.lock().await;
        let count = doc.as_ref().map(|d| d.count).unwrap_or(0) + 1;
        *doc = Some(CounterDocument {
            count,
            last_updated: Utc::now(),
        });
        Ok(count)
    }

    async fn get(&self) -> Result<i64> {
        Ok(self.document.lock().await.as_ref().map(|d| d.count).unwrap_or(0))
    }
}

/// Counter document held in Firestore, updated through its transaction API.
pub struct FirestoreCounterStore {
    client: Client,
    base_url: String,
    database: String,
    document_name: String,
    tokens: TokenSource,
}

enum CommitOutcome {
    Committed,
    Contended,
}

impl FirestoreCounterStore {
    pub fn new(client: Client, base_url: &str, project_id: &str, config: &CounterConfig, tokens: TokenSource) -> Self {
        let database = format!("projects/{}/databases/(default)/documents", project_id);
        let document_name = format!("{}/{}/{}", database, config.collection, config.document);
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            database,
            document_name,
            tokens,
        }
    }

    /// Builds a store for the configured project, or the local emulator when one is set.
    pub fn from_config(client: Client, config: &CounterConfig, tokens: TokenSource) -> Option<Self> {
        match (&config.emulator_host, &config.project_id) {
            (Some(host), project) => {
                let project = project.as_deref().unwrap_or("demo-release-notes");
                let base = format!("http://{}/v1", host);
                Some(Self::new(client, &base, project, config, TokenSource::Emulator))
            }
            (None, Some(project)) => Some(Self::new(client, FIRESTORE_API, project, config, tokens)),
            (None, None) => None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn begin_transaction(&self, token: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url(&format!("{}:beginTransaction", self.database)))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await
            .map_err(store_error)?;
        let body: Value = checked_json(res).await?;

        body["transaction"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::CounterStore("beginTransaction returned no transaction id".to_string()))
    }

    async fn read_count(&self, token: &str, transaction: Option<&str>) -> Result<i64> {
        let mut req = self.client.get(self.url(&self.document_name)).bearer_auth(token);
        if let Some(tx) = transaction {
            req = req.query(&[("transaction", tx)]);
        }

        let res = req.send().await.map_err(store_error)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let doc: Value = checked_json(res).await?;
        decode_count(&doc["fields"]["count"])
    }

    async fn commit(&self, token: &str, transaction: &str, count: i64) -> Result<CommitOutcome> {
        let body = json!({
            "writes": [{
                "update": {
                    "name": self.document_name,
                    "fields": {
                        "count": { "integerValue": count.to_string() },
                        "lastUpdated": { "timestampValue": Utc::now().to_rfc3339() },
                    },
                },
            }],
            "transaction": transaction,
        });

        let res = self
            .client
            .post(self.url(&format!("{}:commit", self.database)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(store_error)?;

        if res.status() == StatusCode::CONFLICT {
            return Ok(CommitOutcome::Contended);
        }
        checked_json::<Value>(res).await?;
        Ok(CommitOutcome::Committed)
    }

    /// Releases the locks held by an abandoned transaction. Failures are only
    /// logged since the caller is already returning an error.
    async fn rollback(&self, token: &str, transaction: &str) {
        let res = self
            .client
            .post(self.url(&format!("{}:rollback", self.database)))
            .bearer_auth(token)
            .json(&json!({ "transaction": transaction }))
            .send()
            .await
            .map_err(store_error);

        let outcome = match res {
            Ok(res) => checked_json::<Value>(res).await.map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, "failed to roll back counter transaction");
        }
    }

    async fn try_increment(&self, token: &str, transaction: &str) -> Result<Option<i64>> {
        let next = self.read_count(token, Some(transaction)).await? + 1;
        match self.commit(token, transaction, next).await? {
            CommitOutcome::Committed => Ok(Some(next)),
            CommitOutcome::Contended => Ok(None),
        }
    }
}

#[async_trait]
impl CounterStore for FirestoreCounterStore {
    async fn increment(&self) -> Result<i64> {
        let token = self.tokens.token(&self.client).await?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let transaction = self.begin_transaction(&token).await?;

            match self.try_increment(&token, &transaction).await {
                Ok(Some(next)) => return Ok(next),
                // an aborted transaction is already released server-side
                Ok(None) => {
                    tracing::debug!(attempt, "counter transaction aborted by contention, retrying");
                }
                Err(err) => {
                    self.rollback(&token, &transaction).await;
                    return Err(err);
                }
            }
        }

        Err(AppError::CounterStore(format!(
            "transaction aborted {} times due to contention",
            MAX_TRANSACTION_ATTEMPTS
        )))
    }

    async fn get(&self) -> Result<i64> {
        let token = self.tokens.token(&self.client).await?;
        self.read_count(&token, None).await
    }
}

fn store_error(err: reqwest::Error) -> AppError {
    AppError::CounterStore(err.to_string())
}

async fn checked_json<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        return Err(AppError::CounterStore(format!("{} ({})", message, status)));
    }
    res.json::<T>().await.map_err(store_error)
}

/// Firestore encodes 64-bit integers as strings. An absent field reads as
/// zero; a present but malformed one is an error rather than a reset.
fn decode_count(value: &Value) -> Result<i64> {
    let malformed = || AppError::CounterStore(format!("counter field is not an integer: {}", value));

    if value.is_null() {
        return Ok(0);
    }
    match (&value["integerValue"], &value["doubleValue"]) {
        (Value::String(s), _) => s.parse().map_err(|_| malformed()),
        (Value::Number(n), _) => n.as_i64().ok_or_else(malformed),
        (Value::Null, Value::Number(f)) => f.as_f64().map(|f| f as i64).ok_or_else(malformed),
        _ => Err(malformed()),
    }
}
