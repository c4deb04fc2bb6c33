use serde::Serialize;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::llm::SummaryError;
use crate::api::models::SummaryErrorBody;

pub fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Logs the failure and renders it, with details only when `verbose`.
pub fn error(err: AppError, verbose: bool) -> Response {
    if err.status().is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }

    err.into_response_with(verbose)
}

/// Non-fatal summary failure attached to an otherwise successful response.
pub fn summary_error(err: &SummaryError, verbose: bool) -> SummaryErrorBody {
    SummaryErrorBody {
        message: err.user_message().to_string(),
        details: verbose.then(|| err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_error_details_follow_verbosity() {
        let err = SummaryError::Auth("API key expired".into());

        let verbose = summary_error(&err, true);
        assert!(verbose.details.unwrap().contains("API key expired"));

        let quiet = summary_error(&err, false);
        assert!(quiet.details.is_none());
        assert!(!quiet.message.contains("expired"));
    }
}
