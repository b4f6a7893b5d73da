//! Score record model.
//!
//! A score is written once by the ingestion path and read back through one of
//! two projections: the public [`ScoreView`] used by ranked and per-player
//! views, and the [`AdminScoreView`] that also exposes the surrogate key and
//! the raw creation timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Row;

/// Fallback shown for rows whose reason text is empty on read.
pub const PREVIOUS_ROUND_REASON: &str = "Previous round";

/// Fallback for `maxFactor` when a stored value cannot be read.
pub const DEFAULT_MAX_FACTOR: i64 = 10;

/// A validated submission, ready to be persisted.
///
/// Only [`crate::ingest::validate_submission`] produces these, so every field
/// is already trimmed, truncated and clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScore {
    pub player_id: String,
    pub name: String,
    pub class_name: String,
    pub points: i64,
    pub attempts: i64,
    pub correct: i64,
    pub accuracy: i64,
    pub best_streak: i64,
    pub max_factor: i64,
    pub elapsed_sec: f64,
    pub avg_sec: f64,
    pub reason_text: String,
    pub mistakes: Vec<Value>,
    pub slowest_correct: Vec<Value>,
}

/// Public projection of a stored score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreView {
    pub player_id: String,
    pub name: String,
    pub class_name: String,
    pub points: i64,
    pub attempts: i64,
    pub correct: i64,
    pub accuracy: i64,
    pub best_streak: i64,
    pub max_factor: i64,
    pub elapsed_sec: f64,
    pub avg_sec: f64,
    pub reason_text: String,
    pub mistakes: Value,
    pub slowest_correct: Value,
    /// Creation time as milliseconds since the Unix epoch.
    pub ts: i64,
}

impl ScoreView {
    /// Normalize a raw store row into the public shape.
    ///
    /// Values that cannot be read as numbers fall back to 0 (10 for
    /// `maxFactor`, `now_ms` for `ts`), so legacy or hand-inserted rows never
    /// break a listing.
    pub fn from_row(row: &Row, now_ms: i64) -> Self {
        Self::from_row_with_reason(row, now_ms, PREVIOUS_ROUND_REASON)
    }

    fn from_row_with_reason(row: &Row, now_ms: i64, reason_fallback: &str) -> Self {
        let reason_text = text(row, "reason_text");
        Self {
            player_id: text(row, "player_id"),
            name: text(row, "name"),
            class_name: text(row, "class_name"),
            points: int_or(row, "points", 0),
            attempts: int_or(row, "attempts", 0),
            correct: int_or(row, "correct", 0),
            accuracy: int_or(row, "accuracy", 0),
            best_streak: int_or(row, "best_streak", 0),
            max_factor: int_or(row, "max_factor", DEFAULT_MAX_FACTOR),
            elapsed_sec: real_or(row, "elapsed_sec", 0.0),
            avg_sec: real_or(row, "avg_sec", 0.0),
            reason_text: if reason_text.is_empty() {
                reason_fallback.to_string()
            } else {
                reason_text
            },
            mistakes: json_array(row, "mistakes"),
            slowest_correct: json_array(row, "slowest_correct"),
            ts: int_or(row, "ts", now_ms),
        }
    }
}

/// Admin projection: the public fields plus `id` and `createdAt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminScoreView {
    pub id: i64,
    #[serde(flatten)]
    pub score: ScoreView,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl AdminScoreView {
    /// Normalize a raw store row into the admin shape.
    ///
    /// Unlike the public views, an empty reason stays empty here.
    pub fn from_row(row: &Row, now_ms: i64) -> Self {
        let score = ScoreView::from_row_with_reason(row, now_ms, "");
        let created_at = DateTime::<Utc>::from_timestamp_millis(score.ts)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        Self {
            id: int_or(row, "id", 0),
            score,
            created_at,
        }
    }
}

fn text(row: &Row, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Read a numeric column, treating zero, NaN and unreadable values as missing.
fn number(row: &Row, key: &str) -> Option<f64> {
    let value = match row.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (value.is_finite() && value != 0.0).then_some(value)
}

fn int_or(row: &Row, key: &str, default: i64) -> i64 {
    if let Some(Value::Number(n)) = row.get(key) {
        if let Some(i) = n.as_i64() {
            return if i == 0 { default } else { i };
        }
    }
    number(row, key).map(|v| v.trunc() as i64).unwrap_or(default)
}

fn real_or(row: &Row, key: &str, default: f64) -> f64 {
    number(row, key).unwrap_or(default)
}

/// Stored JSON arrays come back as text; anything that is not an array reads as `[]`.
fn json_array(row: &Row, key: &str) -> Value {
    let parsed = match row.get(key) {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
        Some(other) => Some(other.clone()),
        None => None,
    };
    match parsed {
        Some(array @ Value::Array(_)) => array,
        _ => Value::Array(Vec::new()),
    }
}
