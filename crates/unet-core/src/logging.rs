//! Structured logging setup: text for local development, JSON for
//! production, with an optional rolling file appender.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global tracing subscriber from [`LoggingConfig`]. Returns
/// the file appender's worker guard, if file logging was configured — the
/// caller must keep it alive for the process lifetime.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| Error::config(format!("invalid logging.filter: {e}")))?;

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("monitoring.log");
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let stdout_layer = if config.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("tracing already initialized: {e}")))?;

    Ok(guard)
}

use tracing_subscriber::layer::Layer;
trait BoxedLayerExt<S>: Layer<S> + Sized + Send + Sync + 'static {
    fn boxed(self) -> Box<dyn Layer<S> + Send + Sync + 'static> {
        Box::new(self)
    }
}
impl<S, L: Layer<S> + Sized + Send + Sync + 'static> BoxedLayerExt<S> for L {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_touching_the_global_subscriber() {
        let config = LoggingConfig {
            filter: "not a valid filter directive (((".to_string(),
            format: "compact".to_string(),
            file_path: None,
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn init_tracing_runs_without_panicking() {
        // The global subscriber can only be installed once per process; later
        // calls (here, or from another test in this binary) legitimately
        // return an error rather than panicking, so only the call itself is
        // asserted, not its outcome.
        let config = LoggingConfig {
            filter: "info".to_string(),
            format: "json".to_string(),
            file_path: None,
        };
        let _ = init_tracing(&config);
    }
}
