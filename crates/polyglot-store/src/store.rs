//! The store: storage engine plus schema catalog.

use crate::catalog::Catalog;
use crate::config::StorageConfig;
use crate::engine::StorageEngine;
use crate::error::Error;
use crate::executor::QueryExecutor;
use crate::record::Record;
use async_trait::async_trait;
use polyglot_core::{Backend, Entity, EntityDef, ScalarType, SchemaBundle};
use polyglot_proto::{FindOptions, FindWhere, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// An embedded row store.
///
/// Rows and schema versions share one sled database. Column names are
/// physical: the store knows nothing about languages.
pub struct Store {
    engine: StorageEngine,
    catalog: Catalog,
}

impl Store {
    /// Open a store with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let engine = StorageEngine::open(config)?;
        let catalog = Catalog::open(engine.db())?;
        Ok(Self { engine, catalog })
    }

    /// Get a reference to the storage engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Get a reference to the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.catalog.flush()?;
        self.engine.flush()
    }

    fn require_schema(&self) -> Result<Arc<SchemaBundle>, Error> {
        self.catalog.current_schema().ok_or(Error::NoSchema)
    }

    fn entity_def<'s>(schema: &'s SchemaBundle, entity: &str) -> Result<&'s EntityDef, Error> {
        schema.get_entity(entity).ok_or_else(|| Error::UnknownEntity {
            entity: entity.to_string(),
        })
    }

    fn check_columns<'c>(
        def: &EntityDef,
        columns: impl IntoIterator<Item = (&'c String, &'c Value)>,
    ) -> Result<(), Error> {
        for (column, value) in columns {
            let field = def.get_field(column).ok_or_else(|| Error::UnknownColumn {
                entity: def.name.clone(),
                column: column.clone(),
            })?;
            if value.is_null() && !field.is_nullable() {
                return Err(Error::NullViolation {
                    entity: def.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Find rows of an entity type.
    pub fn find_rows(&self, entity: &str, options: &FindOptions) -> Result<Vec<Entity>, Error> {
        let schema = self.require_schema()?;
        QueryExecutor::new(&self.engine, &schema).execute(entity, options)
    }

    /// Count rows of an entity type matching a filter.
    pub fn count_rows(&self, entity: &str, filter: Option<&FindWhere>) -> Result<u64, Error> {
        let schema = self.require_schema()?;
        QueryExecutor::new(&self.engine, &schema).count(entity, filter)
    }

    /// Get a row by identity.
    pub fn get_row(&self, entity: &str, id: &Value) -> Result<Option<BTreeMap<String, Value>>, Error> {
        let schema = self.require_schema()?;
        Self::entity_def(&schema, entity)?;
        Ok(self.engine.get(entity, id)?.map(|record| record.to_columns()))
    }

    /// Insert a row and return its identity.
    ///
    /// A missing identity is generated (a sequence for integer identities, a
    /// random UUID for UUID identities). Missing columns take their default
    /// value, or null.
    pub fn insert_row(&self, entity: &str, mut row: BTreeMap<String, Value>) -> Result<Value, Error> {
        let schema = self.require_schema()?;
        let def = Self::entity_def(&schema, entity)?;

        let provided = row
            .get(&def.identity_field)
            .filter(|id| !id.is_null())
            .cloned();
        let id = match provided {
            Some(id) => id,
            None => {
                let id = self.generate_identity(def)?;
                row.insert(def.identity_field.clone(), id.clone());
                id
            }
        };

        for field in &def.fields {
            row.entry(field.name.clone())
                .or_insert_with(|| field.default.clone().unwrap_or(Value::Null));
        }
        Self::check_columns(def, &row)?;

        if !self.engine.insert_new(entity, &id, &Record::new(row))? {
            return Err(Error::DuplicateKey {
                entity: entity.to_string(),
            });
        }
        debug!(entity = entity, "Inserted row");
        Ok(id)
    }

    /// Update the given columns of a row.
    ///
    /// The read and merge happen in one storage transaction, so concurrent
    /// updates of different columns of the same row all survive. Returns the
    /// number of rows affected.
    pub fn update_row(
        &self,
        entity: &str,
        id: &Value,
        patch: BTreeMap<String, Value>,
    ) -> Result<u64, Error> {
        let schema = self.require_schema()?;
        let def = Self::entity_def(&schema, entity)?;

        if patch
            .get(&def.identity_field)
            .is_some_and(|new_id| !new_id.loosely_eq(id))
        {
            return Err(Error::InvalidIdentity {
                entity: entity.to_string(),
            });
        }
        Self::check_columns(def, &patch)?;

        let columns = patch.len();
        self.engine
            .update(entity, id, |mut record| {
                record.merge(patch.clone());
                Ok(record)
            })?
            .ok_or_else(|| Error::NotFound {
                entity: entity.to_string(),
            })?;
        debug!(entity = entity, columns = columns, "Updated row");
        Ok(1)
    }

    fn generate_identity(&self, def: &EntityDef) -> Result<Value, Error> {
        let scalar = def
            .get_identity_field()
            .map(|f| f.field_type.scalar_type());
        match scalar {
            Some(ScalarType::Uuid) => Ok(Value::Uuid(StorageEngine::generate_id())),
            Some(ScalarType::Int64) => Ok(Value::Int64(self.engine.next_sequence()?)),
            Some(ScalarType::Int32) => i32::try_from(self.engine.next_sequence()?)
                .map(Value::Int32)
                .map_err(|_| Error::InvalidIdentity {
                    entity: def.name.clone(),
                }),
            _ => Err(Error::InvalidIdentity {
                entity: def.name.clone(),
            }),
        }
    }
}

#[async_trait]
impl Backend for Store {
    type Error = Error;

    async fn apply_schema(&self, schema: SchemaBundle) -> Result<(), Error> {
        self.catalog.apply_schema(schema)?;
        Ok(())
    }

    fn schema(&self) -> Option<Arc<SchemaBundle>> {
        self.catalog.current_schema()
    }

    async fn find(&self, entity: &str, options: &FindOptions) -> Result<Vec<Entity>, Error> {
        self.find_rows(entity, options)
    }

    async fn count(&self, entity: &str, filter: Option<&FindWhere>) -> Result<u64, Error> {
        self.count_rows(entity, filter)
    }

    async fn insert(&self, entity: &str, row: BTreeMap<String, Value>) -> Result<Value, Error> {
        self.insert_row(entity, row)
    }

    async fn update(
        &self,
        entity: &str,
        id: &Value,
        patch: BTreeMap<String, Value>,
    ) -> Result<u64, Error> {
        self.update_row(entity, id, patch)
    }
}
