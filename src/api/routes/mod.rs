pub mod admin;
pub mod scores;
