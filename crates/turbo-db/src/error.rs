//! Database error types.

use thiserror::Error;

/// Errors raised by the SQL layer.
#[derive(Error, Debug)]
pub enum DbError {
    /// The connection could not be established or was lost.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A statement failed to execute.
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// A statement the connection does not understand.
    #[error("Unsupported statement: {0}")]
    Unsupported(String),

    /// A row could not be mapped onto the requested type.
    #[error("Deserialization error: {0}")]
    DeserializeError(String),

    /// A column held a value of an unexpected type.
    #[error("Type conversion error: {0}")]
    TypeError(String),

    /// No rows returned when one was expected.
    #[error("No rows returned")]
    NotFound,
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::DeserializeError(e.to_string())
    }
}
