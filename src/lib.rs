pub mod attachments;
pub mod auth;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod memos;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod store;
pub mod transcription;
pub mod utils;

pub use routes::create_router;

use tracing_subscriber::EnvFilter;

/// Compact `tracing` output filtered by `RUST_LOG`, `info` by default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
