//! Schema catalog definitions.
//!
//! Entities, columns and relations describing the physical schema handed to
//! a backend, plus the materializer that expands translatable fields into
//! their per-language columns.

mod bundle;
mod entity;
mod field;
mod materialize;
mod relation;
mod types;

pub use bundle::SchemaBundle;
pub use entity::EntityDef;
pub use field::FieldDef;
pub use materialize::SchemaMaterializer;
pub use relation::{Cardinality, RelationDef};
pub use types::{FieldType, ScalarType};
