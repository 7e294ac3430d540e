//! Expands translatable fields into one physical column per language.

use super::{EntityDef, SchemaBundle};
use crate::error::{ConfigurationError, Result};
use crate::registry::{FieldRegistry, FieldState};
use tracing::{debug, info};

/// Adds per-language columns for every translatable field of a schema.
pub struct SchemaMaterializer<'a> {
    registry: &'a FieldRegistry,
}

impl<'a> SchemaMaterializer<'a> {
    /// Create a materializer over a registry.
    pub fn new(registry: &'a FieldRegistry) -> Self {
        Self { registry }
    }

    /// Materialize the columns of one entity.
    ///
    /// The default-language column is the entity's own definition of the
    /// field when it has one, otherwise the registered template. Every other
    /// language gets a nullable clone of it. Existing columns are kept as-is.
    pub fn materialize_entity(&self, entity: &EntityDef) -> Result<EntityDef> {
        let mut out = entity.clone();
        let mut added = 0usize;

        for declaration in self.registry.declarations(&entity.name) {
            let spec = match &declaration.state {
                FieldState::Resolved(spec) => spec.clone(),
                FieldState::Pending => {
                    return Err(ConfigurationError::Unresolved {
                        entity: entity.name.clone(),
                        field: declaration.field.clone(),
                    }
                    .into())
                }
            };

            let template = entity
                .get_field(&declaration.field)
                .cloned()
                .unwrap_or(declaration.template);

            if out.ensure_field(template.clone()) {
                added += 1;
            }
            for language in spec.non_default_languages() {
                let column = spec.column_for(language)?;
                if out.ensure_field(template.renamed(column).as_nullable()) {
                    added += 1;
                }
            }
        }

        if added > 0 {
            debug!(entity = %entity.name, added = added, "Materialized language columns");
        }
        Ok(out)
    }

    /// Materialize every entity of a schema bundle.
    pub fn materialize(&self, bundle: &SchemaBundle) -> Result<SchemaBundle> {
        let mut out = bundle.clone();
        for (name, entity) in &bundle.entities {
            out.entities
                .insert(name.clone(), self.materialize_entity(entity)?);
        }
        info!(
            entities = out.entities.len(),
            version = out.version,
            "Materialized schema"
        );
        Ok(out)
    }
}
