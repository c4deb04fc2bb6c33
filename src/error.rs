use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Warehouse query failed: {0}")]
    Warehouse(String),

    #[error("Counter store error: {0}")]
    CounterStore(String),

    #[error("Credential error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Too many requests")]
    RateLimited,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Warehouse(_)
            | AppError::CounterStore(_)
            | AppError::Auth(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to any client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Warehouse(_) => "Failed to query release notes".to_string(),
            AppError::CounterStore(_) => "Failed to update visitor counter".to_string(),
            AppError::Auth(_) => "Failed to authenticate with upstream service".to_string(),
            AppError::Config(_) => "Server is not configured correctly".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::NotFound => "Not found".to_string(),
            AppError::RateLimited => "Too many requests".to_string(),
        }
    }

    /// Builds the JSON error response, attaching the underlying message
    /// only when `verbose` is set.
    pub fn into_response_with(self, verbose: bool) -> Response {
        let body = Json(ErrorResponse {
            error: self.public_message(),
            details: verbose.then(|| self.to_string()),
        });

        (self.status(), body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Warehouse(err.to_string())
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_map_to_500() {
        assert_eq!(AppError::Warehouse("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::CounterStore("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn public_message_hides_upstream_details() {
        let err = AppError::Warehouse("table secret.dataset not found".into());
        assert!(!err.public_message().contains("secret"));
        assert!(err.to_string().contains("secret"));
    }
}
