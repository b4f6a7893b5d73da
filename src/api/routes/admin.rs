use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use tracing::warn;

use crate::admin::{authorize, AdminFilter, DeleteAction, ADMIN_TOKEN_HEADER};
use crate::api::state::AppState;
use crate::api::{Ack, ApiError, QueryPairs};
use crate::ingest::parse_body;
use crate::models::AdminScoreView;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let supplied = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    authorize(state.admin_token.as_deref(), supplied).map_err(|e| {
        if state.admin_token.is_none() {
            warn!("Admin request rejected: no admin token configured");
        } else {
            warn!("Admin request rejected: bad or missing token");
        }
        ApiError::from(e)
    })
}

/// `GET /admin-api?className=&playerId=&name=&limit=`
pub async fn list_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<AdminScoreView>>, ApiError> {
    require_admin(&state, &headers)?;
    state.store.ensure_schema().await?;

    let params = QueryPairs::from(pairs);
    let filter = AdminFilter::new(
        params.first("className"),
        params.first("playerId"),
        params.first("name"),
        params.first("limit"),
    );
    Ok(Json(state.admin.list(&filter).await?))
}

/// `POST /admin-api` with `{action, id?, playerId?, className?}`
pub async fn mutate_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    require_admin(&state, &headers)?;
    state.store.ensure_schema().await?;

    let body = parse_body(&body)?;
    let action = DeleteAction::from_body(&body)?;
    let deleted = state.admin.delete(&action).await?;
    Ok(Json(Ack::deleted(deleted)))
}
