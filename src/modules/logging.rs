//! Console logging through `tracing`.
//!
//! `RUST_LOG` takes precedence over the level passed in, so a single car or the
//! dispatcher can be turned up with e.g. `RUST_LOG=elevator_bank::modules::car_object=debug`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// init_logging
///
/// # Arguments:
///
/// * `default_level` - &str - Filter used when `RUST_LOG` is not set (e.g. "info").
///
/// Installing a second subscriber is a no-op, so tests may call this freely.
pub fn init_logging(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();
}
