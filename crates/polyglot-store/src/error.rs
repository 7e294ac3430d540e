//! Store error types.

use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Schema encoding error.
    #[error("schema error: {0}")]
    Schema(#[from] polyglot_core::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No schema has been applied yet.
    #[error("no schema applied")]
    NoSchema,

    /// The entity type is not part of the schema.
    #[error("unknown entity: {entity}")]
    UnknownEntity {
        /// Entity type.
        entity: String,
    },

    /// The column is not part of the entity.
    #[error("unknown column '{column}' on entity {entity}")]
    UnknownColumn {
        /// Entity type.
        entity: String,
        /// Column name.
        column: String,
    },

    /// The relation is not defined on the entity.
    #[error("unknown relation '{relation}' on entity {entity}")]
    UnknownRelation {
        /// Entity type.
        entity: String,
        /// Relation name.
        relation: String,
    },

    /// A non-null column would hold null.
    #[error("column '{column}' of entity {entity} cannot be null")]
    NullViolation {
        /// Entity type.
        entity: String,
        /// Column name.
        column: String,
    },

    /// The identity value cannot be used as a row key.
    #[error("invalid identity value for entity {entity}")]
    InvalidIdentity {
        /// Entity type.
        entity: String,
    },

    /// A row with the same identity already exists.
    #[error("duplicate identity in entity {entity}")]
    DuplicateKey {
        /// Entity type.
        entity: String,
    },

    /// Row not found.
    #[error("row not found in entity {entity}")]
    NotFound {
        /// Entity type.
        entity: String,
    },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
