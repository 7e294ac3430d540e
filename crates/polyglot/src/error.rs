//! Facade error types.

use polyglot_core::ConfigurationError;
use thiserror::Error;

/// Facade errors, generic over the wrapped backend's error type.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// Language configuration or column resolution failed.
    #[error(transparent)]
    I18n(#[from] polyglot_core::Error),

    /// The backend failed. Its error is passed through unchanged.
    #[error(transparent)]
    Backend(E),

    /// No row matched a `*_or_fail` lookup or a save target.
    #[error("entity not found: {entity}")]
    EntityNotFound {
        /// Entity type.
        entity: String,
    },

    /// A query builder column referenced an alias that was never joined.
    #[error("unknown alias '{alias}'")]
    UnknownAlias {
        /// The alias.
        alias: String,
    },
}

impl<E> From<ConfigurationError> for Error<E> {
    fn from(err: ConfigurationError) -> Self {
        Error::I18n(polyglot_core::Error::from(err))
    }
}

/// Result alias for facade operations.
pub type Result<T, E> = std::result::Result<T, Error<E>>;
