//! Logging bootstrap.
//!
//! The library only emits `tracing` events. Binaries embedding it call
//! [`init`] once at startup to print them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` wins over `default_directive` when set. Returns `Ok(false)`
/// if a global subscriber was already installed.
///
/// # Errors
///
/// When `default_directive` is not a valid filter directive.
///
/// ```
/// let first = cm_orchestrator::logging::init("info").unwrap();
/// assert!(!cm_orchestrator::logging::init("debug").unwrap() || first);
/// ```
pub fn init(default_directive: &str) -> Result<bool, tracing_subscriber::filter::ParseError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)?,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();
    Ok(installed)
}
