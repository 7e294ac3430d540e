//! Polyglot Core - per-row multilingual columns.
//!
//! This crate holds the language machinery of polyglot: the field
//! configuration registry, the schema materializer that expands translatable
//! fields into one column per language, the entity (de)composition engine,
//! and the query rewriter that maps logical field names to the physical
//! column of a language context.
//!
//! # Modules
//!
//! - [`language`] - Language code normalization and the per-handle context
//! - [`naming`] - Physical column naming rule
//! - [`config`] - Process-wide language configuration
//! - [`registry`] - Translatable field declarations
//! - [`catalog`] - Schema definitions and the materializer
//! - [`entity`] - Entities and multilingual values
//! - [`decompose`] - After-load and before-save transforms
//! - [`rewrite`] - Query rewriting
//! - [`backend`] - The wrapped persistence API

pub mod backend;
pub mod catalog;
pub mod config;
pub mod decompose;
pub mod entity;
pub mod error;
pub mod language;
pub mod naming;
pub mod registry;
pub mod rewrite;

pub use backend::Backend;
pub use catalog::{
    Cardinality, EntityDef, FieldDef, FieldType, RelationDef, ScalarType, SchemaBundle,
    SchemaMaterializer,
};
pub use config::LanguageConfig;
pub use decompose::{ColumnPatch, Decomposer};
pub use entity::{Entity, MultilingualValue, Related};
pub use error::{ConfigurationError, Error, FieldFailure, Result};
pub use language::{normalize_language, LanguageContext};
pub use naming::{column_for, COLUMN_DELIMITER};
pub use registry::{FieldDeclaration, FieldI18nSpec, FieldRegistry, FieldState, I18nOptions};
pub use rewrite::QueryRewriter;

/// Re-export request and value types.
pub use polyglot_proto as proto;
