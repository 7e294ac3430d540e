//! Polyglot request and value types.
//!
//! This crate defines the types exchanged between the i18n column layer and
//! the persistence backend it wraps.
//!
//! # Modules
//!
//! - [`value`] - Runtime column values
//! - [`query`] - Where clauses, ordering, projection and paging for reads

pub mod query;
pub mod value;

pub use query::{
    Condition, Conditions, FindOptions, FindWhere, OrderDirection, OrderSpec, Predicate,
};
pub use value::Value;
