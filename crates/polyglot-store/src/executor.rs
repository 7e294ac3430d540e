//! Query execution over stored rows.
//!
//! A find runs in stages: scan the entity's rows, attach every relation the
//! request needs (requested relations plus those referenced by nested
//! filters, orderings, projections and groupings), filter, sort (NULLs
//! first), group, paginate, then drop relations that were only loaded for
//! evaluation and apply the projection.

use crate::engine::StorageEngine;
use crate::error::Error;
use crate::filter::{condition_columns, relation_paths, FilterEvaluator};
use polyglot_core::{Entity, EntityDef, RelationDef, Related, SchemaBundle};
use polyglot_proto::{Conditions, FindOptions, FindWhere, OrderDirection, OrderSpec, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Relation paths as a tree of relation names.
#[derive(Debug, Clone, Default)]
struct RelationTree {
    children: BTreeMap<String, RelationTree>,
}

impl RelationTree {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }
}

/// Selected columns per relation path.
#[derive(Debug, Clone, Default)]
struct Projection {
    columns: BTreeSet<String>,
    children: BTreeMap<String, Projection>,
}

impl Projection {
    fn from_select(select: &[String]) -> Self {
        let mut root = Projection::default();
        for entry in select {
            let mut node = &mut root;
            let (path, column) = match entry.rsplit_once('.') {
                Some((path, column)) => (path, column),
                None => ("", entry.as_str()),
            };
            for segment in path.split('.').filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.columns.insert(column.to_string());
        }
        root
    }
}

/// Executes find requests against a storage engine and schema.
pub struct QueryExecutor<'a> {
    engine: &'a StorageEngine,
    schema: &'a SchemaBundle,
}

impl<'a> QueryExecutor<'a> {
    /// Create a new query executor.
    pub fn new(engine: &'a StorageEngine, schema: &'a SchemaBundle) -> Self {
        Self { engine, schema }
    }

    /// Execute a find request.
    pub fn execute(&self, entity: &str, options: &FindOptions) -> Result<Vec<Entity>, Error> {
        self.validate(entity, options)?;

        let mut kept = RelationTree::default();
        for path in &options.relations {
            kept.insert(path);
        }
        for column in &options.select {
            if let Some((path, _)) = column.rsplit_once('.') {
                kept.insert(path);
            }
        }

        let mut needed = kept.clone();
        if let Some(filter) = &options.filter {
            for path in relation_paths(filter) {
                needed.insert(&path);
            }
        }
        for column in options
            .order_by
            .iter()
            .map(|o| &o.field)
            .chain(&options.group_by)
        {
            if let Some((path, _)) = column.rsplit_once('.') {
                needed.insert(path);
            }
        }

        let mut rows = self.load(entity)?;
        let scanned = rows.len();
        self.attach(&mut rows, entity, &needed)?;

        if let Some(filter) = &options.filter {
            rows.retain(|row| FilterEvaluator::evaluate(filter, row));
        }
        Self::sort_rows(&mut rows, &options.order_by);
        if !options.group_by.is_empty() {
            Self::group_rows(&mut rows, &options.group_by);
        }
        Self::apply_pagination(&mut rows, options.skip, options.take);

        let projection = Projection::from_select(&options.select);
        for row in rows.iter_mut() {
            self.prune(row, &kept);
            self.project(row, entity, &projection);
        }

        debug!(
            entity = entity,
            scanned = scanned,
            returned = rows.len(),
            "Executed find"
        );
        Ok(rows)
    }

    /// Count the rows matching a filter.
    pub fn count(&self, entity: &str, filter: Option<&FindWhere>) -> Result<u64, Error> {
        let mut options = FindOptions::new();
        options.filter = filter.cloned();
        Ok(self.execute(entity, &options)?.len() as u64)
    }

    fn entity_def(&self, entity: &str) -> Result<&'a EntityDef, Error> {
        self.schema
            .get_entity(entity)
            .ok_or_else(|| Error::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    fn relation(&self, entity: &str, name: &str) -> Result<&'a RelationDef, Error> {
        self.schema
            .get_relation(entity, name)
            .ok_or_else(|| Error::UnknownRelation {
                entity: entity.to_string(),
                relation: name.to_string(),
            })
    }

    /// Follow a relation path, returning the target entity type.
    fn resolve_path(&self, entity: &str, path: &str) -> Result<&'a str, Error> {
        let mut current = self.entity_def(entity)?.name.as_str();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = self.relation(current, segment)?.to_entity.as_str();
        }
        Ok(current)
    }

    fn check_column(&self, entity: &str, column: &str) -> Result<(), Error> {
        if self.entity_def(entity)?.has_field(column) {
            Ok(())
        } else {
            Err(Error::UnknownColumn {
                entity: entity.to_string(),
                column: column.to_string(),
            })
        }
    }

    fn check_column_path(&self, entity: &str, column: &str) -> Result<(), Error> {
        match column.rsplit_once('.') {
            Some((path, column)) => {
                let target = self.resolve_path(entity, path)?;
                self.check_column(target, column)
            }
            None => self.check_column(entity, column),
        }
    }

    fn validate_conditions(&self, entity: &str, conditions: &Conditions) -> Result<(), Error> {
        for column in condition_columns(conditions) {
            self.check_column(entity, column)?;
        }
        for condition in conditions.iter() {
            if let polyglot_proto::Predicate::Related(nested) = &condition.predicate {
                let relation = self.relation(entity, &condition.field)?;
                self.validate_conditions(&relation.to_entity, nested)?;
            }
        }
        Ok(())
    }

    fn validate(&self, entity: &str, options: &FindOptions) -> Result<(), Error> {
        self.entity_def(entity)?;
        if let Some(filter) = &options.filter {
            for group in filter.groups() {
                self.validate_conditions(entity, group)?;
            }
        }
        for column in options
            .order_by
            .iter()
            .map(|o| &o.field)
            .chain(&options.select)
            .chain(&options.group_by)
        {
            self.check_column_path(entity, column)?;
        }
        for path in &options.relations {
            self.resolve_path(entity, path)?;
        }
        Ok(())
    }

    fn load(&self, entity: &str) -> Result<Vec<Entity>, Error> {
        Ok(self
            .engine
            .scan(entity)?
            .into_iter()
            .map(|record| Entity::from_row(entity, record.to_columns()))
            .collect())
    }

    fn attach(&self, rows: &mut [Entity], entity: &str, tree: &RelationTree) -> Result<(), Error> {
        for (name, subtree) in &tree.children {
            let relation = self.relation(entity, name)?;
            let mut targets = self.load(&relation.to_entity)?;
            self.attach(&mut targets, &relation.to_entity, subtree)?;

            for row in rows.iter_mut() {
                let matches: Vec<Entity> = match row.get(&relation.from_field) {
                    Some(key) if !key.is_null() => targets
                        .iter()
                        .filter(|t| {
                            t.get(&relation.to_field)
                                .is_some_and(|v| v.loosely_eq(key))
                        })
                        .cloned()
                        .collect(),
                    _ => Vec::new(),
                };

                let related = if relation.is_to_many() {
                    Related::Many(matches)
                } else {
                    matches
                        .into_iter()
                        .next()
                        .map(|e| Related::One(Box::new(e)))
                        .unwrap_or(Related::Null)
                };
                row.set_relation(name.clone(), related);
            }
        }
        Ok(())
    }

    /// Drop relations that were loaded only to evaluate the request.
    fn prune(&self, row: &mut Entity, kept: &RelationTree) {
        let loaded: Vec<String> = row.relations().keys().cloned().collect();
        for name in loaded {
            match kept.children.get(&name) {
                Some(subtree) => {
                    if let Some(related) = row.relation_mut(&name) {
                        for child in related.iter_mut() {
                            self.prune(child, subtree);
                        }
                    }
                }
                None => {
                    row.remove_relation(&name);
                }
            }
        }
    }

    /// Keep only the selected columns (and the identity column).
    fn project(&self, row: &mut Entity, entity: &str, projection: &Projection) {
        if !projection.columns.is_empty() {
            let identity = self
                .schema
                .get_entity(entity)
                .map(|e| e.identity_field.clone())
                .unwrap_or_default();
            row.retain_columns(|c| c == identity || projection.columns.contains(c));
        }

        for (name, child) in &projection.children {
            let Some(relation) = self.schema.get_relation(entity, name) else {
                continue;
            };
            if let Some(related) = row.relation_mut(name) {
                for target in related.iter_mut() {
                    self.project(target, &relation.to_entity, child);
                }
            }
        }
    }

    /// Value of a column, following to-one relations for `path.column`.
    fn path_value<'r>(row: &'r Entity, column: &str) -> Option<&'r Value> {
        match column.split_once('.') {
            Some((relation, rest)) => match row.relation(relation)? {
                Related::One(target) => Self::path_value(target, rest),
                _ => None,
            },
            None => row.get(column),
        }
    }

    fn sort_rows(rows: &mut [Entity], order_by: &[OrderSpec]) {
        if order_by.is_empty() {
            return;
        }

        rows.sort_by(|a, b| {
            for spec in order_by {
                let cmp = Self::compare_values_opt(
                    Self::path_value(a, &spec.field),
                    Self::path_value(b, &spec.field),
                );
                let cmp = match spec.direction {
                    OrderDirection::Asc => cmp,
                    OrderDirection::Desc => cmp.reverse(),
                };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
    }

    /// Compare two optional values for sorting. NULLs sort first.
    fn compare_values_opt(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        let a = a.unwrap_or(&Value::Null);
        let b = b.unwrap_or(&Value::Null);
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
        }
    }

    /// Keep the first row of every distinct combination of group values.
    fn group_rows(rows: &mut Vec<Entity>, group_by: &[String]) {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        rows.retain(|row| {
            let key: Vec<Value> = group_by
                .iter()
                .map(|c| Self::path_value(row, c).cloned().unwrap_or(Value::Null))
                .collect();
            let duplicate = seen.iter().any(|existing| {
                existing
                    .iter()
                    .zip(&key)
                    .all(|(a, b)| a.loosely_eq(b))
            });
            if !duplicate {
                seen.push(key);
            }
            !duplicate
        });
    }

    fn apply_pagination(rows: &mut Vec<Entity>, skip: Option<u32>, take: Option<u32>) {
        if let Some(skip) = skip {
            let skip = skip as usize;
            if skip >= rows.len() {
                rows.clear();
                return;
            }
            rows.drain(0..skip);
        }
        if let Some(take) = take {
            rows.truncate(take as usize);
        }
    }
}
