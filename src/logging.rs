//! Diagnostic logging for the agent itself (startup, skipped targets,
//! rewrite failures). Call records do not go through here; see [`crate::sink`].

use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostic filter, e.g. `call_logger=debug`.
pub const LOG_ENV: &str = "CALL_LOGGER_LOG";

const DEFAULT_FILTER: &str = "call_logger=info";

/// Installs a stderr subscriber. Leaves an already installed global
/// subscriber in place, so calling this twice or from a host that set up
/// its own tracing is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}
