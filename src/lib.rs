//! # Leaderboard
//!
//! Score leaderboard backend: records game-session results per player and
//! serves ranked views of them over HTTP.
//!
//! ## Architecture
//!
//! - **models**: Score record and its public/admin projections
//! - **storage**: Query execution over the `scores` table (SQLite)
//! - **ingest**: Sanitizing and clamping untrusted submissions
//! - **ranking**: Player history, global and per-class top-N views
//! - **admin**: Token-gated filtered listing and deletion
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod admin;
pub mod api;
pub mod config;
pub mod ingest;
pub mod models;
pub mod ranking;
pub mod storage;

pub use models::*;
