//! Tracing subscriber initialisation for the CLI binary.
//!
//! Verbosity is controlled by the `RUST_LOG` environment variable (defaults
//! to `info` when unset). All existing `log::` call sites are forwarded into
//! the tracing pipeline via `LogTracer`.

/// Initialise the tracing subscriber writing to stderr.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .ok();

    // Forward all log:: macro call sites into the tracing pipeline.
    tracing_log::LogTracer::init().ok();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "foreman logging ready");
}
