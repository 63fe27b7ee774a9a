//! Error types for chainql

use thiserror::Error;

/// Result type alias for chainql operations
pub type QbResult<T> = Result<T, QbError>;

/// Boxed driver error carried through [`QbError::Driver`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for statement construction and execution
#[derive(Debug, Error)]
pub enum QbError {
    /// Compiling a statement that needs a table without one
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed builder input (bad condition, join type, payload, subquery, ...)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The connection does not support the requested statement shape
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Establishing or talking to the connection failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error raised by the driver while executing SQL, passed through unchanged
    #[error(transparent)]
    Driver(DriverError),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QbError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an invalid operation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Wrap a driver error without altering it
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Driver(Box::new(err))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is an invalid operation error
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }

    /// Check if this is an unsupported operation error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Check if this error came from the driver
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// SQLSTATE code of a Postgres driver error, if any.
    #[cfg(feature = "postgres")]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Driver(err) => err
                .downcast_ref::<tokio_postgres::Error>()
                .and_then(|e| e.code())
                .map(|code| code.code()),
            _ => None,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for QbError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::driver(err)
    }
}
