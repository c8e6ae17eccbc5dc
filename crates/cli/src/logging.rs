//! Diagnostic tracing, separate from the progress output on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`. Output goes to stderr so that
/// `--json` output on stdout stays machine-readable.
///
/// # Example
/// ```bash
/// RUST_LOG=pdca_core=debug pdca run delivery --request "add login"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
