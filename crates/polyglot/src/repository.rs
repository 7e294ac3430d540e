//! Language-aware repositories.
//!
//! A repository reads and writes one entity type through the wrapped
//! backend. Reads rewrite logical field names to the physical columns of the
//! current language, then decompose every returned entity (and its loaded
//! relations). Writes flatten translatable fields into their columns before
//! the backend call.

use crate::error::{Error, Result};
use crate::query_builder::QueryBuilder;
use polyglot_core::proto::{FindOptions, FindWhere};
use polyglot_core::{
    Backend, Decomposer, Entity, FieldRegistry, LanguageContext, QueryRewriter, SchemaBundle,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A repository of one entity type.
///
/// Cloning a repository copies its language context; the clones then change
/// language independently.
pub struct Repository<B: Backend> {
    backend: Arc<B>,
    registry: Arc<FieldRegistry>,
    entity: String,
    context: LanguageContext,
}

impl<B: Backend> Clone for Repository<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            registry: self.registry.clone(),
            entity: self.entity.clone(),
            context: self.context.clone(),
        }
    }
}

impl<B: Backend> Repository<B> {
    /// Create a repository with no language set.
    pub fn new(backend: Arc<B>, registry: Arc<FieldRegistry>, entity: impl Into<String>) -> Self {
        Self {
            backend,
            registry,
            entity: entity.into(),
            context: LanguageContext::new(),
        }
    }

    /// Entity type of this repository.
    pub fn entity_type(&self) -> &str {
        &self.entity
    }

    /// Get a reference to the wrapped backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Get a reference to the field registry.
    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Set the current language. Codes are case-insensitive.
    pub fn set_language(&mut self, language: &str) {
        self.context.set(language);
    }

    /// Clear the current language.
    pub fn clear_language(&mut self) {
        self.context.clear();
    }

    /// The current language, if set.
    pub fn get_language(&self) -> Option<&str> {
        self.context.get()
    }

    /// Set the current language (builder style).
    pub fn with_language(mut self, language: &str) -> Self {
        self.set_language(language);
        self
    }

    /// Physical column of `field` in the current language.
    ///
    /// Fields that are not translatable map to themselves; with no language
    /// set, a translatable field maps to its default-language column.
    pub fn get_language_column(&self, field: &str) -> Result<String, B::Error> {
        Ok(QueryRewriter::new(&self.registry).language_column(
            &self.entity,
            field,
            self.get_language(),
        )?)
    }

    /// Create a new, unsaved entity of this type.
    pub fn create(&self) -> Entity {
        Entity::new(self.entity.as_str())
    }

    /// Start a query builder with `alias` naming the root entity.
    pub fn create_query_builder(&self, alias: &str) -> QueryBuilder<B> {
        QueryBuilder::new(self.clone(), alias)
    }

    /// Find entities.
    #[instrument(skip(self, options), fields(entity = %self.entity, language = ?self.get_language()))]
    pub async fn find(&self, options: FindOptions) -> Result<Vec<Entity>, B::Error> {
        let options = self.rewrite_options(&options)?;
        self.fetch(&options, self.get_language()).await
    }

    /// Find entities matching a where clause.
    pub async fn find_by(&self, filter: impl Into<FindWhere>) -> Result<Vec<Entity>, B::Error> {
        self.find(FindOptions::new().with_where(filter)).await
    }

    /// Find the first matching entity.
    pub async fn find_one(&self, options: FindOptions) -> Result<Option<Entity>, B::Error> {
        Ok(self.find(options.take(1)).await?.into_iter().next())
    }

    /// Find the first entity matching a where clause.
    pub async fn find_one_by(
        &self,
        filter: impl Into<FindWhere>,
    ) -> Result<Option<Entity>, B::Error> {
        self.find_one(FindOptions::new().with_where(filter)).await
    }

    /// Find the first matching entity or fail with
    /// [`Error::EntityNotFound`].
    pub async fn find_one_or_fail(&self, options: FindOptions) -> Result<Entity, B::Error> {
        self.find_one(options)
            .await?
            .ok_or_else(|| Error::EntityNotFound {
                entity: self.entity.clone(),
            })
    }

    /// Count entities matching an optional where clause.
    #[instrument(skip(self, filter), fields(entity = %self.entity))]
    pub async fn count(&self, filter: Option<FindWhere>) -> Result<u64, B::Error> {
        let schema = self.backend.schema();
        let filter = filter
            .map(|filter| {
                self.rewriter(schema.as_deref())
                    .rewrite_where(&filter, &self.entity, self.get_language())
            })
            .transpose()?;
        self.backend
            .count(&self.entity, filter.as_ref())
            .await
            .map_err(Error::Backend)
    }

    /// Check whether any entity matches a where clause.
    pub async fn exists(&self, filter: impl Into<FindWhere>) -> Result<bool, B::Error> {
        Ok(self.count(Some(filter.into())).await? > 0)
    }

    /// Persist an entity.
    ///
    /// New entities are inserted with every column; loaded entities update
    /// only the columns changed since load. A scalar edit of a translatable
    /// field is written to the language captured on the entity, or the
    /// field's default language if none. New entities without a language
    /// take the repository's current language.
    #[instrument(skip(self, entity), fields(entity = %self.entity))]
    pub async fn save(&self, entity: &mut Entity) -> Result<(), B::Error> {
        if !entity.is_loaded() && entity.language().is_none() {
            if let Some(language) = self.get_language() {
                entity.set_language(Some(language));
            }
        }

        let decomposer = Decomposer::new(&self.registry);
        let identity = self
            .backend
            .schema()
            .and_then(|s| s.get_entity(&self.entity).map(|e| e.identity_field.clone()));

        if entity.is_loaded() {
            let id = identity
                .as_deref()
                .and_then(|field| entity.get(field))
                .cloned()
                .ok_or_else(|| Error::EntityNotFound {
                    entity: self.entity.clone(),
                })?;

            let patch = decomposer.changed_row(entity)?;
            if !patch.is_empty() {
                let columns = patch.len();
                let affected = self
                    .backend
                    .update(&self.entity, &id, patch)
                    .await
                    .map_err(Error::Backend)?;
                if affected == 0 {
                    return Err(Error::EntityNotFound {
                        entity: self.entity.clone(),
                    });
                }
                debug!(columns = columns, "Updated entity");
            }
        } else {
            let row = decomposer.write_row(entity)?;
            let id = self
                .backend
                .insert(&self.entity, row)
                .await
                .map_err(Error::Backend)?;
            if let Some(field) = identity {
                entity.set(field, id);
            }
            debug!("Inserted entity");
        }

        decomposer.sync_after_save(entity)?;
        Ok(())
    }

    /// Run rewritten options against the backend and decompose the results.
    pub(crate) async fn fetch(
        &self,
        options: &FindOptions,
        language: Option<&str>,
    ) -> Result<Vec<Entity>, B::Error> {
        let mut entities = self
            .backend
            .find(&self.entity, options)
            .await
            .map_err(Error::Backend)?;
        Decomposer::new(&self.registry).decompose_all(&mut entities, language)?;
        debug!(rows = entities.len(), "Loaded entities");
        Ok(entities)
    }

    pub(crate) fn rewriter<'a>(&'a self, schema: Option<&'a SchemaBundle>) -> QueryRewriter<'a> {
        let rewriter = QueryRewriter::new(&self.registry);
        match schema {
            Some(schema) => rewriter.with_schema(schema),
            None => rewriter,
        }
    }

    fn rewrite_options(&self, options: &FindOptions) -> Result<FindOptions, B::Error> {
        let language = self.get_language();
        if language.is_none() {
            return Ok(options.clone());
        }

        let schema = self.backend.schema();
        let rewriter = self.rewriter(schema.as_deref());
        let entity = self.entity.as_str();

        let mut out = options.clone();
        out.filter = options
            .filter
            .as_ref()
            .map(|filter| rewriter.rewrite_where(filter, entity, language))
            .transpose()?;
        out.order_by = rewriter.rewrite_order(&options.order_by, entity, language)?;
        out.select = rewriter.rewrite_select_columns(&options.select, entity, language)?;
        out.group_by = rewriter.rewrite_select_columns(&options.group_by, entity, language)?;
        Ok(out)
    }
}
