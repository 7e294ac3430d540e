//! Polyglot Store - an embedded row store for the polyglot backend API.
//!
//! Rows live in sled, one tree per entity type, encoded with rkyv. Schema
//! versions are kept in a catalog next to the rows. Queries are executed in
//! memory: scan, attach relations, filter, sort, group, paginate, project.
//!
//! # Modules
//!
//! - [`config`] - Storage configuration
//! - [`engine`] - Row storage on sled
//! - [`record`] - Stored row encoding
//! - [`catalog`] - Versioned schema storage
//! - [`filter`] - Where clause evaluation
//! - [`executor`] - Find and count execution
//! - [`store`] - The [`Backend`](polyglot_core::Backend) implementation

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod record;
pub mod store;

pub use catalog::Catalog;
pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use error::{Error, Result};
pub use executor::QueryExecutor;
pub use filter::FilterEvaluator;
pub use record::Record;
pub use store::Store;
