//! Unified error type for query building and execution
//!
//! Building errors (bad arguments, unsupported operations, unknown fields,
//! value conversion) and execution errors (ClickHouse client, row decoding,
//! timeouts) share one type so every builder operation returns
//! `Result<_, QueryError>`.

use thiserror::Error;

use crate::model::ValueError;

/// Unified error type for query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Caller passed an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation is not available for this builder or model
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Field name is not defined on the model
    #[error("Field `{field}` is not defined on model `{model}`")]
    FieldNotFound { model: &'static str, field: String },

    /// Field provider rejected a value
    #[error("Invalid value for field `{field}`: {source}")]
    Conversion {
        field: String,
        #[source]
        source: ValueError,
    },

    /// Indexed access matched no row
    #[error("No row at index {index}")]
    DoesNotExist { index: u64 },

    /// ClickHouse client error (network, malformed SQL, server-side rejection)
    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    /// Row could not be decoded
    #[error("Row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Query timeout
    #[error("Query timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Any other data source failure
    #[error("Data source error: {0}")]
    Source(String),
}

impl QueryError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a conversion error for a field
    pub fn conversion(field: impl Into<String>, source: ValueError) -> Self {
        Self::Conversion {
            field: field.into(),
            source,
        }
    }

    /// Check if this error came from executing a statement rather than building it
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Self::Clickhouse(_) | Self::Decode(_) | Self::Timeout { .. } | Self::Source(_)
        )
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Clickhouse(e) => {
                let msg = e.to_string();
                msg.contains("connection") || msg.contains("timeout") || msg.contains("network")
            }
            _ => false,
        }
    }
}
