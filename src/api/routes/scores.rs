use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;

use crate::api::state::AppState;
use crate::api::{Ack, ApiError, QueryPairs};
use crate::ingest::{insert_score, parse_body, validate_submission};
use crate::models::ScoreView;

/// `GET /get-my-scores?playerId=`
pub async fn get_my_scores(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<ScoreView>>, ApiError> {
    let params = QueryPairs::from(pairs);
    state.store.ensure_schema().await?;
    let rows = state
        .ranking
        .player_history(params.first("playerId").unwrap_or_default())
        .await?;
    Ok(Json(rows))
}

/// `GET /get-top-scores[?className=][&limit=]`
pub async fn get_top_scores(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<ScoreView>>, ApiError> {
    let params = QueryPairs::from(pairs);
    state.store.ensure_schema().await?;
    let rows = state
        .ranking
        .top_scores(params.first("className"), params.first("limit"))
        .await?;
    Ok(Json(rows))
}

/// `POST /submit-score`
pub async fn submit_score(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Ack>, ApiError> {
    state.store.ensure_schema().await?;
    let body = parse_body(&body)?;
    let score = validate_submission(&body)?;
    insert_score(state.store.as_ref(), &score, Utc::now()).await?;
    Ok(Json(Ack::ok()))
}
