//! Logging Setup
//!
//! One-time tracing initialization for binaries and integration tests
//! embedding this crate. `RUST_LOG` wins over the passed default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; subsequent calls are ignored instead of
/// panicking so test binaries can call it from every test.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
