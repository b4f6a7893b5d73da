//! Core data model for the leaderboard.

pub mod score;

pub use score::*;
