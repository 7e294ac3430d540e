//! Core error types.

use thiserror::Error;

/// A field whose language configuration could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    /// Entity type of the field.
    pub entity: String,
    /// Logical field name.
    pub field: String,
    /// Why the field could not be resolved.
    pub reason: String,
}

impl std::fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.entity, self.field, self.reason)
    }
}

/// Language configuration errors.
///
/// Every variant names the entity type and field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The field was declared but its language set is still pending.
    #[error("translatable field {entity}.{field} is used before its languages were resolved")]
    Unresolved {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
    },

    /// The resolved language set is empty.
    #[error("translatable field {entity}.{field} has no languages")]
    EmptyLanguages {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
    },

    /// No default language could be determined.
    #[error("translatable field {entity}.{field} has no default language")]
    MissingDefault {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
    },

    /// The default language is not one of the configured languages.
    #[error(
        "default language '{default_language}' of {entity}.{field} is not in its languages {languages:?}"
    )]
    DefaultNotInLanguages {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
        /// The offending default language.
        default_language: String,
        /// The configured languages.
        languages: Vec<String>,
    },

    /// The field was already declared with different options.
    #[error("translatable field {entity}.{field} is already declared with different options")]
    Conflict {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
    },

    /// Finalizing pending declarations failed for one or more fields.
    #[error("failed to finalize {} translatable field(s): {}", .failures.len(), join_failures(.failures))]
    Finalize {
        /// Every field that could not be resolved.
        failures: Vec<FieldFailure>,
    },
}

fn join_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigurationError {
    /// Describe this error as a finalize failure entry.
    pub(crate) fn to_failure(&self) -> FieldFailure {
        let (entity, field) = match self {
            ConfigurationError::Unresolved { entity, field }
            | ConfigurationError::EmptyLanguages { entity, field }
            | ConfigurationError::MissingDefault { entity, field }
            | ConfigurationError::DefaultNotInLanguages { entity, field, .. }
            | ConfigurationError::Conflict { entity, field } => (entity.clone(), field.clone()),
            ConfigurationError::Finalize { .. } => (String::new(), String::new()),
        };
        FieldFailure {
            entity,
            field,
            reason: self.to_string(),
        }
    }
}

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Language configuration error.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A language is not configured for a translatable field.
    #[error("language '{language}' is not configured for {entity}.{field}")]
    ColumnResolution {
        /// Entity type.
        entity: String,
        /// Logical field name.
        field: String,
        /// The language that has no column.
        language: String,
    },

    /// A relation referenced by a clause does not exist on the entity.
    #[error("unknown relation '{relation}' on entity {entity}")]
    UnknownRelation {
        /// Entity type.
        entity: String,
        /// Relation name.
        relation: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_error_lists_every_field() {
        let err = ConfigurationError::Finalize {
            failures: vec![
                ConfigurationError::EmptyLanguages {
                    entity: "Product".into(),
                    field: "name".into(),
                }
                .to_failure(),
                ConfigurationError::MissingDefault {
                    entity: "Category".into(),
                    field: "title".into(),
                }
                .to_failure(),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("2 translatable field(s)"));
        assert!(message.contains("Product.name"));
        assert!(message.contains("Category.title"));
    }

    #[test]
    fn test_configuration_error_converts() {
        let err: Error = ConfigurationError::Unresolved {
            entity: "Product".into(),
            field: "name".into(),
        }
        .into();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("Product.name"));
    }
}
