//! Tracing setup for hosts embedding the widget core.

use tracing_subscriber::EnvFilter;

/// Filter used when neither an explicit filter nor `RUST_LOG` is provided.
pub const DEFAULT_LOG_FILTER: &str = "chatwidget=info";

/// Install a fmt subscriber. Safe to call more than once; later calls are no-ops.
///
/// Precedence: explicit `filter`, then `RUST_LOG`, then [`DEFAULT_LOG_FILTER`].
pub fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
