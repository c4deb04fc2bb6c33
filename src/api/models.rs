use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::summary::SummaryResult;
use crate::warehouse::ReleaseNote;

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseNotesParams {
    pub timeframe: Option<String>,
    pub types: Option<String>,
    pub products: Option<String>,
    pub summarize: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub types: Vec<String>,
    pub products: Vec<String>,
    pub summarize: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseNotesResponse {
    pub notes: Vec<ReleaseNote>,
    pub filters: AppliedFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<SummaryErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CounterResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
