//! `tracing` subscriber setup for binaries.
//!
//! The library only emits events; installing a subscriber is up to the binary.
//!
//! Event fields:
//! - every training-step event carries `rank` and `step`;
//! - per-chunk events carry `direction`, `chunk` and `offset` (the ground-truth offset).

use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `CLIP_LOG` first, then `RUST_LOG`, then `info`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var("CLIP_LOG").ok(), std::env::var("RUST_LOG").ok())
}

/// First directive string that parses wins; empty or unparsable ones are skipped.
fn filter_from(primary: Option<String>, secondary: Option<String>) -> EnvFilter {
    [primary, secondary]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
