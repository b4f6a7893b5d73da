//! Admin listing and deletion.
//!
//! Every call is gated by a shared secret. Listing filters compose with AND;
//! deletions remove one row by id, every row for a player, or every row in a
//! class.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::info;

use crate::ingest::{coerce_number, safe_text, ValidationError};
use crate::models::AdminScoreView;
use crate::ranking::{LimitRange, PUBLIC_COLUMNS};
use crate::storage::{count_from_rows, ScoreStore, SqlParam, StorageError};

/// Header carrying the admin secret.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Row limit for admin listings.
pub const LIST_LIMIT: LimitRange = LimitRange::new(200, 1000);

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Check a caller-supplied token against the configured one.
///
/// Both sides are trimmed. With no configured token every call is refused.
pub fn authorize(expected: Option<&str>, supplied: Option<&str>) -> Result<(), AdminError> {
    let expected = expected.map(str::trim).unwrap_or_default();
    let supplied = supplied.map(str::trim).unwrap_or_default();
    if expected.is_empty() || supplied.is_empty() {
        return Err(AdminError::Unauthorized);
    }
    if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
        Ok(())
    } else {
        Err(AdminError::Unauthorized)
    }
}

/// Filters for the admin listing. Empty filters are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminFilter {
    /// Case-insensitive exact match.
    pub class_name: Option<String>,
    /// Exact match.
    pub player_id: Option<String>,
    /// Case-insensitive literal substring match.
    pub name: Option<String>,
    pub limit: i64,
}

impl AdminFilter {
    pub fn new(
        class_name: Option<&str>,
        player_id: Option<&str>,
        name: Option<&str>,
        raw_limit: Option<&str>,
    ) -> Self {
        fn clean(v: Option<&str>) -> Option<String> {
            v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        }
        Self {
            class_name: clean(class_name),
            player_id: clean(player_id),
            name: clean(name),
            limit: LIST_LIMIT.resolve(raw_limit),
        }
    }

    /// Build the WHERE clause and its bound parameters.
    fn where_clause(&self) -> (String, Vec<SqlParam>) {
        let mut clauses = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(class_name) = &self.class_name {
            params.push(class_name.as_str().into());
            clauses.push(format!(
                "unicode_lower(class_name) = unicode_lower(?{})",
                params.len()
            ));
        }
        if let Some(player_id) = &self.player_id {
            params.push(player_id.as_str().into());
            clauses.push(format!("player_id = ?{}", params.len()));
        }
        if let Some(name) = &self.name {
            params.push(name.to_lowercase().into());
            clauses.push(format!("instr(unicode_lower(name), ?{}) > 0", params.len()));
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

/// A mutating admin request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteAction {
    Score { id: i64 },
    User { player_id: String },
    Class { class_name: String },
}

impl DeleteAction {
    /// Parse `{action, id?, playerId?, className?}`.
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, ValidationError> {
        match safe_text(body.get("action"), 64).as_str() {
            "deleteScore" => {
                let id = coerce_number(body.get("id"));
                if !id.is_finite() || id <= 0.0 || id.fract() != 0.0 || id > i64::MAX as f64 {
                    return Err(ValidationError::InvalidId);
                }
                Ok(DeleteAction::Score { id: id as i64 })
            }
            "deleteUser" => {
                let player_id = safe_text(body.get("playerId"), usize::MAX);
                if player_id.is_empty() {
                    return Err(ValidationError::Missing("playerId"));
                }
                Ok(DeleteAction::User { player_id })
            }
            "deleteClass" => {
                let class_name = safe_text(body.get("className"), usize::MAX);
                if class_name.is_empty() {
                    return Err(ValidationError::Missing("className"));
                }
                Ok(DeleteAction::Class { class_name })
            }
            _ => Err(ValidationError::UnknownAction),
        }
    }
}

/// Admin operations over a [`ScoreStore`].
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn ScoreStore>,
}

impl AdminService {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self { store }
    }

    /// Newest-first listing with the admin-only `id` and `createdAt` fields.
    pub async fn list(&self, filter: &AdminFilter) -> Result<Vec<AdminScoreView>, AdminError> {
        let (where_sql, mut params) = filter.where_clause();
        params.push(filter.limit.into());
        let sql = format!(
            "SELECT id, {PUBLIC_COLUMNS} FROM scores {where_sql} \
             ORDER BY created_at DESC, id DESC LIMIT ?{}",
            params.len()
        );

        let rows = self.store.query(&sql, params).await?;
        let now_ms = Utc::now().timestamp_millis();
        Ok(rows
            .iter()
            .map(|r| AdminScoreView::from_row(r, now_ms))
            .collect())
    }

    /// Apply a deletion and report how many rows it removed.
    ///
    /// Player and class deletions count first and delete second, as two
    /// statements; a concurrent write in between can make the count stale.
    pub async fn delete(&self, action: &DeleteAction) -> Result<usize, AdminError> {
        let deleted = match action {
            DeleteAction::Score { id } => {
                self.store
                    .execute("DELETE FROM scores WHERE id = ?1", vec![(*id).into()])
                    .await?
            }
            DeleteAction::User { player_id } => {
                self.count_then_delete("player_id = ?1", player_id).await?
            }
            DeleteAction::Class { class_name } => {
                self.count_then_delete(
                    "unicode_lower(class_name) = unicode_lower(?1)",
                    class_name,
                )
                .await?
            }
        };
        info!("Admin {:?} removed {} rows", action, deleted);
        Ok(deleted)
    }

    async fn count_then_delete(&self, predicate: &str, value: &str) -> Result<usize, AdminError> {
        let before = self
            .store
            .query(
                &format!("SELECT COUNT(*) AS c FROM scores WHERE {predicate}"),
                vec![value.into()],
            )
            .await?;
        self.store
            .execute(
                &format!("DELETE FROM scores WHERE {predicate}"),
                vec![value.into()],
            )
            .await?;
        Ok(count_from_rows(&before, "c"))
    }
}
