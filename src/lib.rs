pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod errors;
pub mod feed;
pub mod fingerprint;
pub mod flex_id;
pub mod generation;
pub mod merge;
pub mod preprocessing;
pub mod search;
pub mod state;
