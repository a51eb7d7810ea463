//! Logging initialization and the output log sink.

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "remote_runner=info";

/// Destination for lines of remote command output.
///
/// The runner hands every teed output line to a `LogSink` instead of a
/// process-wide logger, so callers can route command output wherever they
/// want (and tests can record it).
pub trait LogSink: Send + Sync {
    /// Record one line at the given severity.
    fn log(&self, level: Level, line: &str);
}

/// `LogSink` that forwards lines as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn log(&self, level: Level, line: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "remote_runner::output", "{}", line),
            Level::WARN => tracing::warn!(target: "remote_runner::output", "{}", line),
            Level::INFO => tracing::info!(target: "remote_runner::output", "{}", line),
            Level::DEBUG => tracing::debug!(target: "remote_runner::output", "{}", line),
            Level::TRACE => tracing::trace!(target: "remote_runner::output", "{}", line),
        }
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn log(&self, level: Level, line: &str) {
        (**self).log(level, line)
    }
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `remote_runner=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Try to initialize logging with an explicit filter, such as the level
/// from [`Config::log_filter`](crate::config::Config::log_filter).
///
/// A bare level like `debug` is scoped to this crate.
pub fn try_init_with_filter(filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let directive = if filter.contains('=') || filter.contains(',') {
        filter.to_string()
    } else {
        format!("remote_runner={}", filter)
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}
