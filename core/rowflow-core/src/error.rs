//! Error types for the rowflow streaming layer.
//!
//! All public APIs return `FlowResult<T>`.

use thiserror::Error;

/// Unified error type for all rowflow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Store unreachable or handle creation failed
    #[error("connection error: {0}")]
    Connection(String),

    /// A query or row fetch failed
    #[error("fetch error: {message}\nQuery: {query}")]
    Fetch {
        message: String,
        query: String,
        /// Store-side cause, when the failure came from below the stream
        #[source]
        source: Option<Box<FlowError>>,
    },

    /// Caller-supplied parameter violates a precondition
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more concurrent units failed (wraps the first failure)
    #[error("concurrent fetch failed at unit {index}: {source}")]
    AggregateFetch {
        index: usize,
        #[source]
        source: Box<FlowError>,
    },

    /// SQL parsing error
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Unsupported SQL feature
    #[error("SQL feature not supported: {feature}\nHint: {hint}")]
    SqlNotSupported { feature: String, hint: String },

    /// Requested table does not exist
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Requested column does not exist
    #[error("column '{column}' not found in '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Type mismatch between expected and actual values
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Constraint violation (column count, duplicate table, etc.)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FlowError {
    /// Shorthand for a [`FlowError::Fetch`] tied to the query that failed.
    pub fn fetch(message: impl Into<String>, query: impl Into<String>) -> Self {
        FlowError::Fetch {
            message: message.into(),
            query: query.into(),
            source: None,
        }
    }

    /// Re-reports a store failure of `query` as [`FlowError::Fetch`].
    ///
    /// `Fetch`, `InvalidArgument` and `Connection` pass through unchanged.
    pub fn into_fetch(self, query: &str) -> Self {
        match self {
            FlowError::Fetch { .. } | FlowError::InvalidArgument(_) | FlowError::Connection(_) => {
                self
            }
            other => FlowError::Fetch {
                message: other.to_string(),
                query: query.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Whether the retry layer may attempt the unit of work again.
    ///
    /// Argument, parse and connection failures are surfaced immediately;
    /// store-side failures are retryable.
    pub fn is_retryable(&self) -> bool {
        if let FlowError::Fetch {
            source: Some(cause), ..
        } = self
        {
            return cause.is_retryable();
        }
        !matches!(
            self,
            FlowError::InvalidArgument(_)
                | FlowError::Connection(_)
                | FlowError::Config(_)
                | FlowError::SqlParse { .. }
                | FlowError::SqlNotSupported { .. }
        )
    }
}

/// Result type alias for all rowflow operations.
pub type FlowResult<T> = Result<T, FlowError>;

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}
