//! Diagnostics via `RUST_LOG`, written to stderr.
//!
//! Warnings raised by the controller (protected module, already toggled
//! modules, foreign path entries) surface through this subscriber, so the
//! default level is `warn`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// ```bash
/// RUST_LOG=toolbox_core=debug toolbox disable aero
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
