//! Ranked read views over the `scores` table.
//!
//! Three views are served:
//! - **player history**: a player's ten best rows
//! - **global top-N**: best row per identity across all classes
//! - **class top-N**: best row per name within one class
//!
//! Every view orders by the same tie-break chain: points, accuracy, best
//! streak, then recency (all descending). The top-N views first keep each
//! identity's single best row under that chain, then rank the survivors.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::RankingConfig;
use crate::ingest::{clamp_f64_to_int, ValidationError};
use crate::models::ScoreView;
use crate::storage::{ScoreStore, SqlParam, StorageError};

/// Rows returned by the player history view.
pub const HISTORY_LIMIT: i64 = 10;

/// Columns of the public projection, with `ts` as epoch milliseconds.
pub(crate) const PUBLIC_COLUMNS: &str = "player_id, name, class_name, points, attempts, \
     correct, accuracy, best_streak, max_factor, elapsed_sec, avg_sec, reason_text, mistakes, \
     slowest_correct, created_at AS ts";

/// Tie-break chain; `id` makes rows inserted in the same millisecond deterministic.
const RANK_ORDER: &str =
    "points DESC, accuracy DESC, best_streak DESC, created_at DESC, id DESC";

#[derive(Debug, Error)]
pub enum RankingError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What counts as "the same player" when keeping one row per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Case-insensitive name only.
    #[default]
    Name,
    /// Case-insensitive name paired with the exact class label.
    NameAndClass,
}

impl IdentityPolicy {
    fn partition_sql(self) -> &'static str {
        match self {
            IdentityPolicy::Name => "unicode_lower(name)",
            IdentityPolicy::NameAndClass => "unicode_lower(name), class_name",
        }
    }
}

/// A caller-adjustable row limit with a default and an inclusive ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRange {
    pub default: i64,
    pub max: i64,
}

impl LimitRange {
    pub const fn new(default: i64, max: i64) -> Self {
        Self { default, max }
    }

    /// Resolve a raw query-string value.
    ///
    /// Absent or blank uses the default; anything unparsable falls to 1;
    /// numbers are truncated and clamped into `[1, max]`.
    pub fn resolve(&self, raw: Option<&str>) -> i64 {
        match raw.map(str::trim) {
            None | Some("") => self.default.clamp(1, self.max),
            Some(s) => clamp_f64_to_int(s.parse::<f64>().unwrap_or(f64::NAN), 1, self.max),
        }
    }
}

/// Read-side ranking over a [`ScoreStore`].
#[derive(Clone)]
pub struct RankingEngine {
    store: Arc<dyn ScoreStore>,
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn ScoreStore>, config: RankingConfig) -> Self {
        Self { store, config }
    }

    /// The ten best rows for one player.
    pub async fn player_history(&self, player_id: &str) -> Result<Vec<ScoreView>, RankingError> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(ValidationError::Missing("playerId").into());
        }

        let sql = format!(
            "SELECT {PUBLIC_COLUMNS} FROM scores WHERE player_id = ?1 \
             ORDER BY {RANK_ORDER} LIMIT ?2"
        );
        let rows = self
            .store
            .query(&sql, vec![player_id.into(), HISTORY_LIMIT.into()])
            .await?;

        let now_ms = Utc::now().timestamp_millis();
        Ok(rows.iter().map(|r| ScoreView::from_row(r, now_ms)).collect())
    }

    /// Top-N with one row per identity.
    ///
    /// With a class name the view is restricted to that exact class and
    /// identity is the name alone; otherwise the configured global policy
    /// applies.
    pub async fn top_scores(
        &self,
        class_name: Option<&str>,
        raw_limit: Option<&str>,
    ) -> Result<Vec<ScoreView>, RankingError> {
        let class_name = class_name.map(str::trim).filter(|c| !c.is_empty());

        let (policy, limit, filter, mut params): (_, _, _, Vec<SqlParam>) = match class_name {
            Some(class) => (
                IdentityPolicy::Name,
                self.config.class_limit.resolve(raw_limit),
                "WHERE class_name = ?1",
                vec![class.into()],
            ),
            None => (
                self.config.global_identity,
                self.config.global_limit.resolve(raw_limit),
                "",
                Vec::new(),
            ),
        };
        params.push(limit.into());
        let limit_param = params.len();

        let sql = format!(
            "WITH best AS (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY {partition} ORDER BY {RANK_ORDER}
                ) AS identity_rank
                FROM scores {filter}
            )
            SELECT {PUBLIC_COLUMNS} FROM best
            WHERE identity_rank = 1
            ORDER BY {RANK_ORDER}
            LIMIT ?{limit_param}",
            partition = policy.partition_sql(),
        );
        debug!(
            "Top scores: class={:?} policy={:?} limit={}",
            class_name, policy, limit
        );

        let rows = self.store.query(&sql, params).await?;
        let now_ms = Utc::now().timestamp_millis();
        Ok(rows.iter().map(|r| ScoreView::from_row(r, now_ms)).collect())
    }
}
