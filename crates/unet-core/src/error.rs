//! Unified error taxonomy for the monitoring engine.
//!
//! Every error is classified along the lines operators actually care about
//! when deciding how to react: is this transient (retry and move on), is it a
//! configuration mistake (fix and restart), does it mean the data is no
//! longer trustworthy, is a backend down, or is it a bug.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration. Not retryable — needs operator action.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A probe (ICMP or SNMP) failed in a way expected to clear on its own:
    /// timeout, connection refused, transient network blip.
    #[error("transient transport error during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The current-state store rejected a write because it would violate an
    /// invariant the caller assumed held (e.g. a compare-and-set conflict on
    /// `updated_at`, or a duplicate active-problem row).
    #[error("consistency violation in {context}: {message}")]
    Consistency { context: String, message: String },

    /// A required backend (database, time-series sink, broker) is down or
    /// unreachable. Distinct from `Transient` because the caller should
    /// degrade (e.g. stop serving reads) rather than just retry the one call.
    #[error("{backend} is unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Input failed validation before it ever reached a backend.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Database-layer error from sea-orm that doesn't fit a more specific category.
    #[error("database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    /// Indicates a bug — an invariant the code itself should have maintained was broken.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn consistency(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consistency {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn database(operation: impl Into<String>, source: sea_orm::DbErr) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a caller should simply retry the operation that produced this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::BackendUnavailable { .. })
    }
}

impl From<sea_orm::DbErr> for Error {
    fn from(source: sea_orm::DbErr) -> Self {
        Self::Database {
            operation: "query".to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization {
            message: source.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            message: source.to_string(),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(source: config::ConfigError) -> Self {
        Self::Config {
            message: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_backend_errors_are_retryable() {
        assert!(Error::transient("ping", "timeout").is_retryable());
        assert!(Error::backend_unavailable("timeseries", "connection refused").is_retryable());
        assert!(!Error::config("missing DB_URL").is_retryable());
        assert!(!Error::validation("bad ip").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::transient("snmp_poll", "request timed out");
        let rendered = err.to_string();
        assert!(rendered.contains("snmp_poll"));
        assert!(rendered.contains("request timed out"));
    }
}
