//! Translation of dashboard filters into warehouse queries.

mod bigquery;

pub use bigquery::BigQueryStore;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// One release note row as stored in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNote {
    pub product_name: String,
    pub release_note_type: String,
    pub description: String,
    pub published_at: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeframe {
    #[default]
    SevenDays,
    ThirtyDays,
    NinetyDays,
}

impl Timeframe {
    pub fn parse(code: &str) -> Result<Self> {
        match code.trim() {
            "7d" => Ok(Timeframe::SevenDays),
            "30d" => Ok(Timeframe::ThirtyDays),
            "90d" => Ok(Timeframe::NinetyDays),
            other => Err(AppError::BadRequest(format!(
                "Invalid timeframe '{}', expected one of 7d, 30d, 90d",
                other
            ))),
        }
    }

    pub fn days(self) -> u64 {
        match self {
            Timeframe::SevenDays => 7,
            Timeframe::ThirtyDays => 30,
            Timeframe::NinetyDays => 90,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
            Timeframe::NinetyDays => "90d",
        }
    }

    /// Calendar-day window ending at `now` (UTC, matching the warehouse's DATE semantics).
    pub fn date_range(self, now: DateTime<Utc>) -> DateRange {
        let end = now.date_naive();
        let start = end - Days::new(self.days());
        DateRange { start, end }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Inclusive range of publication dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Optional type/product restrictions; an empty list means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseNoteFilter {
    pub types: Vec<String>,
    pub products: Vec<String>,
}

impl ReleaseNoteFilter {
    pub fn matches(&self, note: &ReleaseNote) -> bool {
        (self.types.is_empty() || self.types.contains(&note.release_note_type))
            && (self.products.is_empty() || self.products.contains(&note.product_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParameter {
    Date { name: &'static str, value: NaiveDate },
    StringArray { name: &'static str, values: Vec<String> },
}

impl QueryParameter {
    pub fn name(&self) -> &'static str {
        match self {
            QueryParameter::Date { name, .. } | QueryParameter::StringArray { name, .. } => name,
        }
    }
}

/// Parameterized SQL ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParameter>,
}

pub fn release_notes_query(table_ref: &str, filter: &ReleaseNoteFilter, range: DateRange) -> QueryRequest {
    let mut sql = format!(
        "SELECT product_name, release_note_type, description, published_at \
         FROM `{}` \
         WHERE published_at BETWEEN @startDate AND @endDate",
        table_ref
    );
    let mut params = vec![
        QueryParameter::Date {
            name: "startDate",
            value: range.start,
        },
        QueryParameter::Date {
            name: "endDate",
            value: range.end,
        },
    ];

    if !filter.types.is_empty() {
        sql.push_str(" AND release_note_type IN UNNEST(@types)");
        params.push(QueryParameter::StringArray {
            name: "types",
            values: filter.types.clone(),
        });
    }

    if !filter.products.is_empty() {
        sql.push_str(" AND product_name IN UNNEST(@products)");
        params.push(QueryParameter::StringArray {
            name: "products",
            values: filter.products.clone(),
        });
    }

    sql.push_str(" ORDER BY published_at DESC");

    QueryRequest { sql, params }
}

pub fn distinct_products_query(table_ref: &str) -> QueryRequest {
    distinct_column_query(table_ref, "product_name")
}

pub fn distinct_types_query(table_ref: &str) -> QueryRequest {
    distinct_column_query(table_ref, "release_note_type")
}

fn distinct_column_query(table_ref: &str, column: &str) -> QueryRequest {
    QueryRequest {
        sql: format!(
            "SELECT DISTINCT {column} FROM `{table_ref}` WHERE {column} IS NOT NULL ORDER BY {column} ASC"
        ),
        params: Vec::new(),
    }
}

/// Read-only access to release notes and their filter vocabularies.
#[async_trait]
pub trait ReleaseNoteStore: Send + Sync {
    async fn release_notes(&self, filter: &ReleaseNoteFilter, range: DateRange) -> Result<Vec<ReleaseNote>>;

    /// Distinct product names, sorted ascending.
    async fn products(&self) -> Result<Vec<String>>;

    /// Distinct note types, sorted ascending.
    async fn types(&self) -> Result<Vec<String>>;
}
