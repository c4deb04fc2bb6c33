use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    distinct_products_query, distinct_types_query, release_notes_query, DateRange, QueryParameter,
    QueryRequest, ReleaseNote, ReleaseNoteFilter, ReleaseNoteStore,
};
use crate::config::WarehouseConfig;
use crate::error::{AppError, Result};
use crate::gcp::TokenSource;

const POLL_TIMEOUT_MS: u64 = 10_000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Deserialize)]
struct TableCell {
    v: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
struct ErrorProto {
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

type Row = HashMap<String, Value>;

/// Release notes served from BigQuery through its REST API.
pub struct BigQueryStore {
    client: Client,
    config: WarehouseConfig,
    tokens: TokenSource,
}

impl BigQueryStore {
    pub fn new(client: Client, config: WarehouseConfig, tokens: TokenSource) -> Self {
        Self { client, config, tokens }
    }

    fn project(&self) -> Result<&str> {
        self.config
            .project_id
            .as_deref()
            .ok_or_else(|| AppError::Config("BIGQUERY_PROJECT_ID is not set".to_string()))
    }

    async fn run(&self, query: &QueryRequest) -> Result<Vec<Row>> {
        let project = self.project()?;
        let token = self.tokens.token(&self.client).await?;
        let url = format!("{}/projects/{}/queries", self.config.api_base, project);

        let body = json!({
            "query": query.sql,
            "useLegacySql": false,
            "location": self.config.location,
            "parameterMode": "NAMED",
            "queryParameters": query.params.iter().map(encode_parameter).collect::<Vec<_>>(),
            "timeoutMs": POLL_TIMEOUT_MS,
        });

        tracing::debug!(sql = %query.sql, params = query.params.len(), "running warehouse query");
        let res = self.client.post(&url).bearer_auth(&token).json(&body).send().await?;
        let mut page = read_response(res).await?;

        let mut fields: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        loop {
            if !page.errors.is_empty() {
                let messages: Vec<String> = page.errors.into_iter().map(|e| e.message).collect();
                return Err(AppError::Warehouse(messages.join("; ")));
            }

            if page.job_complete {
                if fields.is_none() {
                    fields = page
                        .schema
                        .as_ref()
                        .map(|s| s.fields.iter().map(|f| f.name.clone()).collect());
                }
                let names = fields
                    .as_ref()
                    .ok_or_else(|| AppError::Warehouse("query response has no schema".to_string()))?;
                rows.extend(page.rows.into_iter().map(|row| zip_row(names, row)));

                if page.page_token.is_none() {
                    break;
                }
            }

            let next_token = page.page_token.take();
            let job = page
                .job_reference
                .ok_or_else(|| AppError::Warehouse("query response has no job reference".to_string()))?;
            page = self.fetch_results(project, &token, &job, next_token.as_deref()).await?;
        }

        Ok(rows)
    }

    async fn fetch_results(
        &self,
        project: &str,
        token: &str,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = format!("{}/projects/{}/queries/{}", self.config.api_base, project, job.job_id);
        let location = job.location.as_deref().unwrap_or(&self.config.location);
        let timeout = POLL_TIMEOUT_MS.to_string();

        let mut query: Vec<(&str, &str)> = vec![("location", location), ("timeoutMs", timeout.as_str())];
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token));
        }

        let res = self.client.get(&url).bearer_auth(token).query(&query).send().await?;
        read_response(res).await
    }

    async fn string_column(&self, query: QueryRequest, column: &str) -> Result<Vec<String>> {
        let rows = self.run(&query).await?;
        rows.iter()
            .map(|row| string_field(row, column))
            .collect()
    }
}

#[async_trait]
impl ReleaseNoteStore for BigQueryStore {
    async fn release_notes(&self, filter: &ReleaseNoteFilter, range: DateRange) -> Result<Vec<ReleaseNote>> {
        let query = release_notes_query(&self.config.table_ref(), filter, range);
        let rows = self.run(&query).await?;
        rows.iter().map(decode_note).collect()
    }

    async fn products(&self) -> Result<Vec<String>> {
        self.string_column(distinct_products_query(&self.config.table_ref()), "product_name")
            .await
    }

    async fn types(&self) -> Result<Vec<String>> {
        self.string_column(distinct_types_query(&self.config.table_ref()), "release_note_type")
            .await
    }
}

async fn read_response(res: reqwest::Response) -> Result<QueryResponse> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        return Err(AppError::Warehouse(format!("{} ({})", message, status)));
    }

    res.json::<QueryResponse>()
        .await
        .map_err(|e| AppError::Warehouse(format!("invalid query response: {}", e)))
}

fn encode_parameter(param: &QueryParameter) -> Value {
    match param {
        QueryParameter::Date { name, value } => json!({
            "name": name,
            "parameterType": { "type": "DATE" },
            "parameterValue": { "value": value.format("%Y-%m-%d").to_string() },
        }),
        QueryParameter::StringArray { name, values } => json!({
            "name": name,
            "parameterType": { "type": "ARRAY", "arrayType": { "type": "STRING" } },
            "parameterValue": {
                "arrayValues": values.iter().map(|v| json!({ "value": v })).collect::<Vec<_>>(),
            },
        }),
    }
}

fn zip_row(names: &[String], row: TableRow) -> Row {
    names.iter().cloned().zip(row.f.into_iter().map(|cell| cell.v)).collect()
}

fn string_field(row: &Row, column: &str) -> Result<String> {
    match row.get(column) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(AppError::Warehouse(format!("column '{}' is missing", column))),
        Some(other) => Ok(other.to_string()),
    }
}

fn decode_note(row: &Row) -> Result<ReleaseNote> {
    let published = string_field(row, "published_at")?;
    let published_at = NaiveDate::parse_from_str(&published, "%Y-%m-%d")
        .map_err(|e| AppError::Warehouse(format!("invalid published_at '{}': {}", published, e)))?;

    Ok(ReleaseNote {
        product_name: string_field(row, "product_name")?,
        release_note_type: string_field(row, "release_note_type")?,
        description: string_field(row, "description").unwrap_or_default(),
        published_at,
    })
}
