//! Commerce error types.

use thiserror::Error;

use crate::ids::ProductId;
use crate::index::BackendError;

/// Errors raised by the pricing engine and the product index.
#[derive(Error, Debug)]
pub enum CommerceError {
    /// A condition document names a type nobody registered.
    #[error("Unknown condition type: {0}")]
    UnknownConditionType(String),

    /// An action document names a type nobody registered.
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// A filter definition names a type nobody registered.
    #[error("Filter type \"{0}\" is not registered")]
    UnknownFilterType(String),

    /// A rule, condition or filter document is malformed.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Tenant setup is inconsistent (worker binding, attribute set).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A query combination the index cannot answer.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// A code path with no implementation yet.
    #[error("Not implemented yet: {0}")]
    NotImplemented(String),

    /// No price system with this name is configured.
    #[error("Price system not found: {0}")]
    PriceSystemNotFound(String),

    /// The mockup store has no data for the product.
    #[error("No index data stored for product {0}")]
    MockupDataMissing(ProductId),

    /// Search backend error.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Cache error.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<turbo_db::DbError> for CommerceError {
    fn from(e: turbo_db::DbError) -> Self {
        CommerceError::DatabaseError(e.to_string())
    }
}

impl From<turbo_cache::CacheError> for CommerceError {
    fn from(e: turbo_cache::CacheError) -> Self {
        CommerceError::CacheError(e.to_string())
    }
}

impl From<serde_json::Error> for CommerceError {
    fn from(e: serde_json::Error) -> Self {
        CommerceError::SerializationError(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CommerceError> = std::result::Result<T, E>;
