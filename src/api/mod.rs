//! REST API endpoints.
//!
//! Axum-based HTTP API for submitting scores, reading ranked views, and the
//! token-gated admin surface. Every response carries `Cache-Control: no-store`.

pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::admin::{AdminError, ADMIN_TOKEN_HEADER};
use crate::ingest::ValidationError;
use crate::ranking::RankingError;
use crate::storage::StorageError;
use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body for 400s.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            ApiError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
            }
            ApiError::Internal(detail) => {
                error!("Request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<RankingError> for ApiError {
    fn from(e: RankingError) -> Self {
        match e {
            RankingError::Invalid(v) => v.into(),
            RankingError::Storage(s) => s.into(),
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Unauthorized => ApiError::Unauthorized,
            AdminError::Invalid(v) => v.into(),
            AdminError::Storage(s) => s.into(),
        }
    }
}

/// Success acknowledgment, with a deletion count for admin mutations.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            deleted: None,
        }
    }

    pub fn deleted(count: usize) -> Self {
        Self {
            ok: true,
            deleted: Some(count),
        }
    }
}

/// Query-string pairs in arrival order. A repeated key resolves to its first
/// value instead of failing extraction.
#[derive(Debug, Default)]
pub struct QueryPairs(Vec<(String, String)>);

impl QueryPairs {
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl From<Vec<(String, String)>> for QueryPairs {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match origin.trim() {
        "*" | "" => AllowOrigin::any(),
        exact => match HeaderValue::from_str(exact) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!("Invalid CORS origin {:?}, allowing any", exact);
                AllowOrigin::any()
            }
        },
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ])
}

/// Build the application router.
///
/// GET routes register an explicit HEAD handler; axum would otherwise answer
/// HEAD through the GET handler.
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route(
            "/get-my-scores",
            get(routes::scores::get_my_scores)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/get-top-scores",
            get(routes::scores::get_top_scores)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/submit-score",
            post(routes::scores::submit_score).fallback(method_not_allowed),
        )
        .route(
            "/admin-api",
            get(routes::admin::list_scores)
                .head(method_not_allowed)
                .post(routes::admin::mutate_scores)
                .fallback(method_not_allowed),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
