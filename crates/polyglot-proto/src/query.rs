//! Request model for reads: predicates, ordering, projection and paging.
//!
//! Column names in these types are whatever the caller wrote. Before they
//! reach a backend, logical names of translatable fields are rewritten to the
//! physical column for the active language.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A predicate applied to a single column (or relation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Column equals value.
    Eq(Value),
    /// Column not equals value.
    Ne(Value),
    /// Column less than value.
    Lt(Value),
    /// Column less than or equal to value.
    Le(Value),
    /// Column greater than value.
    Gt(Value),
    /// Column greater than or equal to value.
    Ge(Value),
    /// Column is in a set of values.
    In(Vec<Value>),
    /// Column is not in a set of values.
    NotIn(Vec<Value>),
    /// Column is null.
    IsNull,
    /// Column is not null.
    IsNotNull,
    /// Column matches a LIKE pattern.
    Like(String),
    /// Column does not match a LIKE pattern.
    NotLike(String),
    /// The key names a relation; the nested conditions apply to the related
    /// entity (any related entity for to-many relations).
    Related(Conditions),
}

/// A single `key => predicate` entry of a condition object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Column or relation name.
    pub field: String,
    /// Predicate applied to the column.
    pub predicate: Predicate,
}

/// A condition object: every entry must hold (logical AND).
///
/// Entries keep insertion order so rewritten clauses line up with the
/// caller's input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// The entries of this condition object.
    pub entries: Vec<Condition>,
}

impl Conditions {
    /// Create an empty condition object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary predicate.
    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.entries.push(Condition {
            field: field.into(),
            predicate,
        });
        self
    }

    /// Add an equality predicate.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Eq(value.into()))
    }

    /// Add a not-equal predicate.
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Ne(value.into()))
    }

    /// Add a less-than predicate.
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Lt(value.into()))
    }

    /// Add a less-than-or-equal predicate.
    pub fn le(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Le(value.into()))
    }

    /// Add a greater-than predicate.
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Gt(value.into()))
    }

    /// Add a greater-than-or-equal predicate.
    pub fn ge(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Predicate::Ge(value.into()))
    }

    /// Add an IN predicate.
    pub fn in_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Predicate::In(values))
    }

    /// Add a NOT IN predicate.
    pub fn not_in_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Predicate::NotIn(values))
    }

    /// Add an IS NULL predicate.
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(field, Predicate::IsNull)
    }

    /// Add an IS NOT NULL predicate.
    pub fn is_not_null(self, field: impl Into<String>) -> Self {
        self.with(field, Predicate::IsNotNull)
    }

    /// Add a LIKE predicate.
    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(field, Predicate::Like(pattern.into()))
    }

    /// Add a NOT LIKE predicate.
    pub fn not_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(field, Predicate::NotLike(pattern.into()))
    }

    /// Add a nested condition object on a relation.
    pub fn related(self, relation: impl Into<String>, nested: Conditions) -> Self {
        self.with(relation, Predicate::Related(nested))
    }

    /// Append every entry of `other`.
    pub fn extend(&mut self, other: Conditions) {
        self.entries.extend(other.entries);
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.entries.iter()
    }

    /// Field names referenced at the top level.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.field.as_str())
    }

    /// Check whether this object has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A where clause: either one condition object or an array of them
/// (logical OR across the array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FindWhere {
    /// A single condition object.
    All(Conditions),
    /// Any of the condition objects must hold.
    Any(Vec<Conditions>),
}

impl FindWhere {
    /// Build an OR clause from several condition objects.
    pub fn any(groups: Vec<Conditions>) -> Self {
        FindWhere::Any(groups)
    }

    /// The condition objects of this clause (one for [`FindWhere::All`]).
    pub fn groups(&self) -> &[Conditions] {
        match self {
            FindWhere::All(conditions) => std::slice::from_ref(conditions),
            FindWhere::Any(groups) => groups,
        }
    }

    /// Apply `f` to every condition object, keeping the clause shape.
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&Conditions) -> Result<Conditions, E>,
    ) -> Result<FindWhere, E> {
        match self {
            FindWhere::All(conditions) => Ok(FindWhere::All(f(conditions)?)),
            FindWhere::Any(groups) => groups
                .iter()
                .map(f)
                .collect::<Result<Vec<_>, E>>()
                .map(FindWhere::Any),
        }
    }
}

impl From<Conditions> for FindWhere {
    fn from(conditions: Conditions) -> Self {
        FindWhere::All(conditions)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Options of a find call.
///
/// `select` and `group_by` entries are column names of the root entity, or
/// `relation.path.column` for columns of loaded relations. `relations` lists
/// dot-separated relation paths to load eagerly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Optional where clause.
    pub filter: Option<FindWhere>,
    /// Ordering specification.
    pub order_by: Vec<OrderSpec>,
    /// Projected columns (empty means all).
    pub select: Vec<String>,
    /// Grouping columns (empty means no grouping).
    pub group_by: Vec<String>,
    /// Relation paths to load.
    pub relations: Vec<String>,
    /// Number of rows to skip.
    pub skip: Option<u32>,
    /// Maximum number of rows to return.
    pub take: Option<u32>,
}

impl FindOptions {
    /// Create empty find options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the where clause.
    pub fn with_where(mut self, filter: impl Into<FindWhere>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Add ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Add a projected column.
    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.select.push(column.into());
        self
    }

    /// Add a grouping column.
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    /// Load a relation path.
    pub fn with_relation(mut self, path: impl Into<String>) -> Self {
        self.relations.push(path.into());
        self
    }

    /// Skip the first `skip` rows.
    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `take` rows.
    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }
}
