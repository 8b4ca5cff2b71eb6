//! Error types for the repository.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Error returned by a modification listener. Logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building or using a repository.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepoError {
    /// The builder was misconfigured. Fatal at build time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A unique index already holds the key.
    #[error("duplicate key {key} in index {index}")]
    DuplicateKey {
        /// Name of the index that rejected the key.
        index: String,
        /// Rendered key.
        key: String,
    },

    /// No record is stored under the primary key.
    #[error("no record with key {key}")]
    NotFound {
        /// Rendered key.
        key: String,
    },

    /// The attribute is read-only.
    #[error("attribute {attribute} is read-only")]
    UnsupportedMutation {
        /// Attribute name.
        attribute: String,
    },

    /// A value could not be converted to the declared attribute type.
    #[error("cannot coerce {value} to {target}")]
    Coercion {
        /// Rendered input value.
        value: String,
        /// Declared target type.
        target: String,
    },

    /// The query named an index that is not registered.
    #[error("unknown index {0}")]
    UnknownIndex(String),

    /// The index cannot answer this kind of query.
    #[error("index {index} does not support {query} queries")]
    UnsupportedQuery {
        /// Index name.
        index: String,
        /// Query operator.
        query: &'static str,
    },

    /// The primary key resolved to null.
    #[error("primary key {attribute} is null")]
    NullKey {
        /// Primary key attribute name.
        attribute: String,
    },

    /// A non-nullable attribute holds null.
    #[error("attribute {attribute} is null")]
    NullValue {
        /// Attribute name.
        attribute: String,
    },
}

impl RepoError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RepoError::Configuration(msg.into())
    }
}
