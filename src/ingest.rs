//! Score submission ingestion.
//!
//! Turns an untrusted JSON payload into a [`NewScore`] whose every field is
//! within range, then writes it as a single row. Nothing reaches the store
//! until validation has succeeded.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::models::NewScore;
use crate::storage::{ScoreStore, SqlParam, StorageError};

pub const MAX_PLAYER_ID_LEN: usize = 80;
pub const MAX_NAME_LEN: usize = 40;
pub const MAX_CLASS_NAME_LEN: usize = 40;
pub const MAX_REASON_LEN: usize = 80;
pub const MAX_MISTAKES: usize = 80;
pub const MAX_SLOWEST_CORRECT: usize = 10;
/// Upper bound for points, attempts, correct answers and streaks.
pub const MAX_COUNTER: i64 = 1_000_000;
pub const MAX_ELAPSED_SEC: f64 = 600.0;
pub const MAX_AVG_SEC: f64 = 60.0;

/// Placeholder for an empty name or class.
pub const UNKNOWN_LABEL: &str = "Unknown";
/// Placeholder for an empty session-end reason.
pub const FINISHED_REASON: &str = "Finished";

/// Rejections for malformed client input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Missing {0}")]
    Missing(&'static str),

    #[error("Missing/invalid id")]
    InvalidId,

    #[error("Unknown action")]
    UnknownAction,
}

/// Parse a request body as JSON.
///
/// Bodies that parse but are not objects come back as an empty object, so
/// they fail later on their missing required fields.
pub fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(_) => Err(ValidationError::InvalidJson),
    }
}

/// Loose numeric coercion.
///
/// Missing values, objects, arrays and unparsable strings are NaN; null and
/// blank strings are 0; booleans are 1 or 0. Numbers keep their source text,
/// so a literal too large for `f64` reads as infinity.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.to_string().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Array(_) | Value::Object(_)) => f64::NAN,
    }
}

/// Truncate toward zero and clamp; non-finite input becomes `min`.
pub fn clamp_int(value: Option<&Value>, min: i64, max: i64) -> i64 {
    clamp_f64_to_int(coerce_number(value), min, max)
}

pub(crate) fn clamp_f64_to_int(x: f64, min: i64, max: i64) -> i64 {
    if !x.is_finite() {
        return min;
    }
    x.trunc().clamp(min as f64, max as f64) as i64
}

/// Clamp a real value; non-finite input becomes `min`.
pub fn clamp_float(value: Option<&Value>, min: f64, max: f64) -> f64 {
    let x = coerce_number(value);
    if !x.is_finite() {
        return min;
    }
    x.clamp(min, max)
}

/// Stringify, trim, and cap at `max_len` characters.
pub fn safe_text(value: Option<&Value>, max_len: usize) -> String {
    let raw = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    raw.trim().chars().take(max_len).collect()
}

/// Keep the first `max_len` elements of an array; anything else is empty.
pub fn safe_array(value: Option<&Value>, max_len: usize) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.iter().take(max_len).cloned().collect(),
        _ => Vec::new(),
    }
}

fn or_default(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// Validate and normalize a submission payload.
pub fn validate_submission(body: &Map<String, Value>) -> Result<NewScore, ValidationError> {
    let player_id = safe_text(body.get("playerId"), MAX_PLAYER_ID_LEN);
    if player_id.is_empty() {
        return Err(ValidationError::Missing("playerId"));
    }

    Ok(NewScore {
        player_id,
        name: or_default(safe_text(body.get("name"), MAX_NAME_LEN), UNKNOWN_LABEL),
        class_name: or_default(
            safe_text(body.get("className"), MAX_CLASS_NAME_LEN),
            UNKNOWN_LABEL,
        ),
        points: clamp_int(body.get("points"), 0, MAX_COUNTER),
        attempts: clamp_int(body.get("attempts"), 0, MAX_COUNTER),
        correct: clamp_int(body.get("correct"), 0, MAX_COUNTER),
        accuracy: clamp_int(body.get("accuracy"), 0, 100),
        best_streak: clamp_int(body.get("bestStreak"), 0, MAX_COUNTER),
        max_factor: clamp_int(body.get("maxFactor"), 1, 12),
        elapsed_sec: clamp_float(body.get("elapsedSec"), 0.0, MAX_ELAPSED_SEC),
        avg_sec: clamp_float(body.get("avgSec"), 0.0, MAX_AVG_SEC),
        reason_text: or_default(
            safe_text(body.get("reasonText"), MAX_REASON_LEN),
            FINISHED_REASON,
        ),
        mistakes: safe_array(body.get("mistakes"), MAX_MISTAKES),
        slowest_correct: safe_array(body.get("slowestCorrect"), MAX_SLOWEST_CORRECT),
    })
}

/// Insert one validated score.
pub async fn insert_score(
    store: &dyn ScoreStore,
    score: &NewScore,
    created_at: DateTime<Utc>,
) -> Result<(), StorageError> {
    let params: Vec<SqlParam> = vec![
        score.player_id.as_str().into(),
        score.name.as_str().into(),
        score.class_name.as_str().into(),
        score.points.into(),
        score.attempts.into(),
        score.correct.into(),
        score.accuracy.into(),
        score.best_streak.into(),
        score.max_factor.into(),
        score.elapsed_sec.into(),
        score.avg_sec.into(),
        score.reason_text.as_str().into(),
        Value::Array(score.mistakes.clone()).to_string().into(),
        Value::Array(score.slowest_correct.clone()).to_string().into(),
        created_at.timestamp_millis().into(),
    ];

    store
        .execute(
            "INSERT INTO scores (
                player_id, name, class_name,
                points, attempts, correct, accuracy,
                best_streak, max_factor,
                elapsed_sec, avg_sec,
                reason_text, mistakes, slowest_correct,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params,
        )
        .await?;

    info!(
        "Recorded score for player {} ({} points, class {})",
        score.player_id, score.points, score.class_name
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_parse_body_invalid_json() {
        assert_eq!(parse_body(b"{not json"), Err(ValidationError::InvalidJson));
        assert_eq!(parse_body(b""), Err(ValidationError::InvalidJson));
    }

    #[test]
    fn test_parse_body_non_object_is_empty() {
        assert!(parse_body(b"[1,2,3]").unwrap().is_empty());
        assert!(parse_body(b"null").unwrap().is_empty());
    }

    #[test]
    fn test_parse_body_accepts_out_of_range_numbers() {
        let map = parse_body(br#"{"playerId": "p", "points": 1e400, "avgSec": -1e400}"#).unwrap();
        assert_eq!(coerce_number(map.get("points")), f64::INFINITY);

        let score = validate_submission(&map).unwrap();
        assert_eq!(score.points, 0);
        assert_eq!(score.avg_sec, 0.0);
    }

    #[test]
    fn test_missing_player_id() {
        let err = validate_submission(&body(json!({"name": "Ada"}))).unwrap_err();
        assert_eq!(err, ValidationError::Missing("playerId"));
        assert_eq!(err.to_string(), "Missing playerId");
    }

    #[test]
    fn test_whitespace_player_id_rejected() {
        let err = validate_submission(&body(json!({"playerId": "   \t "}))).unwrap_err();
        assert_eq!(err, ValidationError::Missing("playerId"));
    }

    #[test]
    fn test_full_valid_submission() {
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "name": "A",
            "className": "5B",
            "points": 120,
            "accuracy": 90,
            "bestStreak": 7,
            "maxFactor": 10,
            "elapsedSec": 30,
            "avgSec": 2.5,
            "reasonText": "done",
            "mistakes": [],
            "slowestCorrect": []
        })))
        .unwrap();

        assert_eq!(score.player_id, "p1");
        assert_eq!(score.class_name, "5B");
        assert_eq!(score.points, 120);
        assert_eq!(score.accuracy, 90);
        assert_eq!(score.best_streak, 7);
        assert_eq!(score.max_factor, 10);
        assert_eq!(score.elapsed_sec, 30.0);
        assert_eq!(score.avg_sec, 2.5);
        assert_eq!(score.reason_text, "done");
        assert_eq!(score.attempts, 0);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "points": -5,
            "attempts": 5_000_000,
            "correct": 12.9,
            "accuracy": 250,
            "bestStreak": -0.5,
            "maxFactor": 99,
            "elapsedSec": 1e9,
            "avgSec": -3
        })))
        .unwrap();

        assert_eq!(score.points, 0);
        assert_eq!(score.attempts, MAX_COUNTER);
        assert_eq!(score.correct, 12);
        assert_eq!(score.accuracy, 100);
        assert_eq!(score.best_streak, 0);
        assert_eq!(score.max_factor, 12);
        assert_eq!(score.elapsed_sec, MAX_ELAPSED_SEC);
        assert_eq!(score.avg_sec, 0.0);
    }

    #[test]
    fn test_non_numeric_values_fall_to_range_minimum() {
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "points": "lots",
            "accuracy": {"v": 1},
            "maxFactor": "Infinity",
            "elapsedSec": [1, 2],
            "avgSec": "NaN"
        })))
        .unwrap();

        assert_eq!(score.points, 0);
        assert_eq!(score.accuracy, 0);
        assert_eq!(score.max_factor, 1);
        assert_eq!(score.elapsed_sec, 0.0);
        assert_eq!(score.avg_sec, 0.0);
    }

    #[test]
    fn test_numeric_strings_and_booleans_coerce() {
        let score = validate_submission(&body(json!({
            "playerId": 42,
            "points": " 77 ",
            "maxFactor": true,
            "accuracy": ""
        })))
        .unwrap();

        assert_eq!(score.player_id, "42");
        assert_eq!(score.points, 77);
        assert_eq!(score.max_factor, 1);
        assert_eq!(score.accuracy, 0);
    }

    #[test]
    fn test_text_defaults_and_truncation() {
        let long_name = "N".repeat(100);
        let long_id = "x".repeat(200);
        let score = validate_submission(&body(json!({
            "playerId": format!("  {long_id}  "),
            "name": long_name,
            "className": "   ",
            "reasonText": null
        })))
        .unwrap();

        assert_eq!(score.player_id.chars().count(), MAX_PLAYER_ID_LEN);
        assert_eq!(score.name.chars().count(), MAX_NAME_LEN);
        assert_eq!(score.class_name, UNKNOWN_LABEL);
        assert_eq!(score.reason_text, FINISHED_REASON);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "name": "ø".repeat(60)
        })))
        .unwrap();
        assert_eq!(score.name, "ø".repeat(MAX_NAME_LEN));
    }

    #[test]
    fn test_arrays_are_capped_preserving_order() {
        let mistakes: Vec<Value> = (0..100).map(|i| json!({"n": i})).collect();
        let slowest: Vec<Value> = (0..25).map(Value::from).collect();
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "mistakes": mistakes,
            "slowestCorrect": slowest
        })))
        .unwrap();

        assert_eq!(score.mistakes.len(), MAX_MISTAKES);
        assert_eq!(score.mistakes[0], json!({"n": 0}));
        assert_eq!(score.mistakes[79], json!({"n": 79}));
        assert_eq!(score.slowest_correct, (0..10).map(Value::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_non_array_collections_become_empty() {
        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "mistakes": "oops",
            "slowestCorrect": {"a": 1}
        })))
        .unwrap();
        assert!(score.mistakes.is_empty());
        assert!(score.slowest_correct.is_empty());
    }

    #[tokio::test]
    async fn test_insert_score_writes_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().await.unwrap();

        let score = validate_submission(&body(json!({
            "playerId": "p1",
            "name": "Ada",
            "points": 10,
            "mistakes": [{"a": 2, "b": 3}]
        })))
        .unwrap();
        let created_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        insert_score(&store, &score, created_at).await.unwrap();

        let rows = store
            .query(
                "SELECT player_id, points, mistakes, slowest_correct, created_at FROM scores",
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["player_id"], json!("p1"));
        assert_eq!(rows[0]["points"], json!(10));
        assert_eq!(rows[0]["mistakes"], json!("[{\"a\":2,\"b\":3}]"));
        assert_eq!(rows[0]["slowest_correct"], json!("[]"));
        assert_eq!(rows[0]["created_at"], json!(1_700_000_000_123_i64));
    }
}
