//! Logging initialization.
//!
//! The core emits structured events through `tracing`; the embedding
//! binary decides where they go. This helper installs a sensible
//! default subscriber for binaries that do not need anything fancier.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: a fmt layer filtered by
/// `RUST_LOG`, defaulting to info-level events from this crate.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("streamrank=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
