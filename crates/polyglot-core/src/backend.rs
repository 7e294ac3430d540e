//! The persistence API wrapped by the multilingual layer.
//!
//! A backend stores and queries rows by physical column name and knows
//! nothing about languages. Its errors are passed through to callers
//! unchanged.

use crate::catalog::SchemaBundle;
use crate::entity::Entity;
use async_trait::async_trait;
use polyglot_proto::{FindOptions, FindWhere, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row-level persistence primitives.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Install (or replace) the physical schema.
    async fn apply_schema(&self, schema: SchemaBundle) -> Result<(), Self::Error>;

    /// The installed schema, if any.
    fn schema(&self) -> Option<Arc<SchemaBundle>>;

    /// Find rows of an entity type.
    ///
    /// Returned entities hold physical column names and have the requested
    /// relations attached.
    async fn find(&self, entity: &str, options: &FindOptions) -> Result<Vec<Entity>, Self::Error>;

    /// Count rows of an entity type matching a filter.
    async fn count(&self, entity: &str, filter: Option<&FindWhere>) -> Result<u64, Self::Error>;

    /// Insert a row and return its identity value.
    async fn insert(
        &self,
        entity: &str,
        row: BTreeMap<String, Value>,
    ) -> Result<Value, Self::Error>;

    /// Update the given columns of the row with identity `id`.
    ///
    /// Returns the number of rows affected.
    async fn update(
        &self,
        entity: &str,
        id: &Value,
        patch: BTreeMap<String, Value>,
    ) -> Result<u64, Self::Error>;
}
