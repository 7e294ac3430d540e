//! The data-source handle.

use crate::error::{Error, Result};
use crate::repository::Repository;
use polyglot_core::{
    Backend, ConfigurationError, FieldRegistry, FieldState, I18nOptions, SchemaBundle,
    SchemaMaterializer,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// A backend wrapped with multilingual column support.
///
/// # Example
///
/// ```ignore
/// use polyglot::{I18nOptions, Polyglot};
/// use polyglot_store::{StorageConfig, Store};
///
/// let db = Polyglot::new(Store::open(StorageConfig::new("./data"))?);
/// db.declare(
///     "Product",
///     "name",
///     I18nOptions::new()
///         .with_languages(["en", "es", "fr"])
///         .with_default_language("en"),
/// )?;
/// db.synchronize(schema).await?;
///
/// let mut products = db.repository("Product");
/// products.set_language("es");
/// let rows = products.find_by(Conditions::new().eq("name", "Portátil")).await?;
/// ```
pub struct Polyglot<B: Backend> {
    backend: Arc<B>,
    registry: Arc<FieldRegistry>,
}

impl<B: Backend> Clone for Polyglot<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<B: Backend> Polyglot<B> {
    /// Wrap a backend using the process-wide field registry.
    pub fn new(backend: B) -> Self {
        Self::with_registry(Arc::new(backend), FieldRegistry::global())
    }

    /// Wrap a shared backend with an explicit field registry.
    pub fn with_registry(backend: Arc<B>, registry: Arc<FieldRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Get a reference to the field registry.
    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Get a reference to the wrapped backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Declare a translatable field.
    pub fn declare(
        &self,
        entity: &str,
        field: &str,
        options: I18nOptions,
    ) -> std::result::Result<FieldState, ConfigurationError> {
        self.registry.declare(entity, field, options)
    }

    /// Finalize pending fields, expand translatable fields into their
    /// language columns and install the result in the backend.
    ///
    /// Returns the schema as installed.
    #[instrument(skip(self, schema), fields(version = schema.version))]
    pub async fn synchronize(&self, schema: SchemaBundle) -> Result<SchemaBundle, B::Error> {
        self.registry.finalize_pending()?;
        let materialized = SchemaMaterializer::new(&self.registry).materialize(&schema)?;
        self.backend
            .apply_schema(materialized.clone())
            .await
            .map_err(Error::Backend)?;

        info!(
            entities = materialized.entities.len(),
            "Synchronized schema"
        );
        Ok(materialized)
    }

    /// Create a repository for an entity type, with no language set.
    pub fn repository(&self, entity: &str) -> Repository<B> {
        Repository::new(self.backend.clone(), self.registry.clone(), entity)
    }
}
