//! Logging initialization for embedding hosts

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber.
///
/// Respects `RUST_LOG` when set, otherwise defaults to
/// `info,memoria=debug`. Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,memoria=debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
