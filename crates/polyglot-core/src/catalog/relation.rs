//! Relation definitions between entities.

use rkyv::{Archive, Deserialize, Serialize};

/// Cardinality of a relation, seen from the owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum Cardinality {
    /// Many owners point at one target (foreign key on the owner).
    ManyToOne,
    /// One owner, one target.
    OneToOne,
    /// One owner, many targets (foreign key on the target).
    OneToMany,
}

/// A named relation from one entity to another.
///
/// `name` is the property under which related entities are attached to an
/// owner when the relation is loaded. Owner rows match target rows where
/// `owner[from_field] == target[to_field]`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation (property) name, unique per owning entity.
    pub name: String,
    /// Owning entity name.
    pub from_entity: String,
    /// Column on the owning entity.
    pub from_field: String,
    /// Target entity name.
    pub to_entity: String,
    /// Column on the target entity.
    pub to_field: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
}

impl RelationDef {
    fn build(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            from_field: from_field.into(),
            to_entity: to_entity.into(),
            to_field: to_field.into(),
            cardinality,
        }
    }

    /// Create a many-to-one relation.
    pub fn many_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
            Cardinality::ManyToOne,
        )
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
            Cardinality::OneToOne,
        )
    }

    /// Create a one-to-many relation.
    pub fn one_to_many(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            from_entity,
            from_field,
            to_entity,
            to_field,
            Cardinality::OneToMany,
        )
    }

    /// Check whether loading this relation yields a list.
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::OneToMany
    }
}
