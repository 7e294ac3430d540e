//! Polyglot - per-row multilingual columns for an ORM layer.
//!
//! A translatable field `name` declared with languages `[en, es, fr]` and
//! default `en` is stored in the columns `name`, `name_es` and `name_fr` of
//! the same row. Repositories and query builders take a current language:
//! logical field names in where clauses, orderings, projections and
//! groupings are rewritten to that language's column, and loaded entities
//! expose the field as a scalar in that language plus a
//! [`MultilingualValue`] holding every translation.
//!
//! # Modules
//!
//! - [`database`] - The data-source handle
//! - [`repository`] - Per-entity repositories
//! - [`query_builder`] - Alias-based query builder
//! - [`error`] - Facade errors

pub mod database;
pub mod error;
pub mod query_builder;
pub mod repository;

pub use database::Polyglot;
pub use error::{Error, Result};
pub use query_builder::QueryBuilder;
pub use repository::Repository;

pub use polyglot_core::{
    normalize_language, Backend, Cardinality, ConfigurationError, EntityDef, Entity, FieldDef,
    FieldRegistry, FieldState, FieldType, I18nOptions, LanguageConfig, MultilingualValue,
    Related, RelationDef, ScalarType, SchemaBundle,
};
pub use polyglot_proto::{
    Conditions, FindOptions, FindWhere, OrderDirection, OrderSpec, Predicate, Value,
};
