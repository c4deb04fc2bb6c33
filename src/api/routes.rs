use axum::{
    routing::{get, post},
    Router,
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    middleware,
    response::Response,
};
use chrono::Utc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api::models::{
    AppliedFilters, CounterResponse, HealthResponse, ProductsResponse, ReleaseNotesParams,
    ReleaseNotesResponse, TypesResponse,
};
use crate::api::rate_limit::rate_limit;
use crate::api::response;
use crate::config::CorsOrigins;
use crate::error::{AppError, Result};
use crate::warehouse::{ReleaseNoteFilter, Timeframe};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .route("/release-notes", get(release_notes_handler))
        .route("/meta/products", get(products_handler))
        .route("/meta/types", get(types_handler))
        .route("/visitor-counter", get(get_counter_handler))
        .route("/visitor-counter/increment", post(increment_counter_handler))
        .fallback(api_not_found)
        .layer(middleware::from_fn_with_state(app_state.clone(), rate_limit));

    let static_dir = &app_state.config.static_dir;
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .fallback_service(spa)
        .layer(cors_layer(&app_state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::from(Any),
        CorsOrigins::List(list) => AllowOrigin::list(list.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin"))
                .ok()
        })),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn health_handler() -> Response {
    response::success(HealthResponse { status: "ok" })
}

async fn api_not_found() -> Response {
    response::error(AppError::NotFound, false)
}

async fn release_notes_handler(
    State(state): State<AppState>,
    Query(params): Query<ReleaseNotesParams>,
) -> Response {
    let start_time = std::time::Instant::now();
    let result = process_release_notes_request(&state, params).await;
    tracing::info!(elapsed_ms = start_time.elapsed().as_millis() as u64, ok = result.is_ok(), "release notes request processed");

    match result {
        Ok(body) => response::success(body),
        Err(err) => response::error(err, state.verbose_errors()),
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(), Some("true" | "1" | "yes"))
}

async fn process_release_notes_request(state: &AppState, params: ReleaseNotesParams) -> Result<ReleaseNotesResponse> {
    let timeframe = match params.timeframe.as_deref() {
        Some(code) if !code.trim().is_empty() => Timeframe::parse(code)?,
        _ => Timeframe::default(),
    };
    let filter = ReleaseNoteFilter {
        types: split_list(params.types.as_deref()),
        products: split_list(params.products.as_deref()),
    };
    let summarize = parse_flag(params.summarize.as_deref());
    let range = timeframe.date_range(Utc::now());

    tracing::info!(
        timeframe = %timeframe,
        start = %range.start,
        end = %range.end,
        types = ?filter.types,
        products = ?filter.products,
        summarize,
        "fetching release notes"
    );

    let notes = state.notes.release_notes(&filter, range).await?;
    tracing::debug!(count = notes.len(), "release notes fetched");

    let (summary, summary_error) = if summarize {
        match state.summarizer.summarize(&notes).await {
            Ok(summary) => (summary, None),
            Err(err) => {
                tracing::warn!(error = %err, "summary generation failed");
                (None, Some(response::summary_error(&err, state.verbose_errors())))
            }
        }
    } else {
        (None, None)
    };

    Ok(ReleaseNotesResponse {
        notes,
        filters: AppliedFilters {
            timeframe: timeframe.code().to_string(),
            start_date: range.start,
            end_date: range.end,
            types: filter.types,
            products: filter.products,
            summarize,
        },
        summary,
        summary_error,
    })
}

async fn products_handler(State(state): State<AppState>) -> Response {
    match state.notes.products().await {
        Ok(products) => response::success(ProductsResponse { products }),
        Err(err) => response::error(err, state.verbose_errors()),
    }
}

async fn types_handler(State(state): State<AppState>) -> Response {
    match state.notes.types().await {
        Ok(types) => response::success(TypesResponse { types }),
        Err(err) => response::error(err, state.verbose_errors()),
    }
}

async fn get_counter_handler(State(state): State<AppState>) -> Response {
    match state.counter.get().await {
        Ok(count) => response::success(CounterResponse { count }),
        Err(err) => response::error(err, state.verbose_errors()),
    }
}

async fn increment_counter_handler(State(state): State<AppState>) -> Response {
    match state.counter.increment().await {
        Ok(count) => {
            tracing::debug!(count, "visitor counter incremented");
            response::success(CounterResponse { count })
        }
        Err(err) => response::error(err, state.verbose_errors()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_split_and_trimmed() {
        assert_eq!(split_list(Some("FEATURE, FIX,,")), vec!["FEATURE", "FIX"]);
        assert!(split_list(Some("")).is_empty());
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn summarize_flag_accepts_truthy_values() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some("TRUE")));
        assert!(parse_flag(Some("1")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(None));
    }
}
