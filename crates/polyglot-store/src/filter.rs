//! Filter evaluation for query execution.
//!
//! `FilterEvaluator` evaluates where clauses against rows. Nested relation
//! clauses are evaluated against the related rows already attached to the
//! row; a to-many relation matches when any related row matches.

use polyglot_core::Entity;
use polyglot_proto::{Condition, Conditions, FindWhere, Predicate, Value};
use std::collections::BTreeSet;

/// Collect the relation paths referenced by nested clauses of a filter.
pub fn relation_paths(filter: &FindWhere) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    for group in filter.groups() {
        collect_paths(group, "", &mut paths);
    }
    paths
}

fn collect_paths(conditions: &Conditions, prefix: &str, paths: &mut BTreeSet<String>) {
    for condition in conditions.iter() {
        if let Predicate::Related(nested) = &condition.predicate {
            let path = if prefix.is_empty() {
                condition.field.clone()
            } else {
                format!("{prefix}.{}", condition.field)
            };
            collect_paths(nested, &path, paths);
            paths.insert(path);
        }
    }
}

/// Collect the plain columns referenced by a condition object (no nested
/// relation clauses).
pub fn condition_columns(conditions: &Conditions) -> impl Iterator<Item = &str> {
    conditions
        .iter()
        .filter(|c| !matches!(c.predicate, Predicate::Related(_)))
        .map(|c| c.field.as_str())
}

/// Evaluates where clauses against rows.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a where clause. An OR clause matches when any group does.
    pub fn evaluate(filter: &FindWhere, row: &Entity) -> bool {
        match filter {
            FindWhere::All(conditions) => Self::evaluate_conditions(conditions, row),
            FindWhere::Any(groups) => groups
                .iter()
                .any(|group| Self::evaluate_conditions(group, row)),
        }
    }

    /// Evaluate a condition object. Every condition must hold.
    pub fn evaluate_conditions(conditions: &Conditions, row: &Entity) -> bool {
        conditions
            .iter()
            .all(|condition| Self::evaluate_condition(condition, row))
    }

    fn evaluate_condition(condition: &Condition, row: &Entity) -> bool {
        let field = condition.field.as_str();
        match &condition.predicate {
            Predicate::Eq(value) => Self::compare_field(row, field, value, Value::loosely_eq),
            Predicate::Ne(value) => {
                Self::compare_field(row, field, value, |a, b| !a.loosely_eq(b))
            }
            Predicate::Lt(value) => Self::compare_field(row, field, value, |a, b| {
                Self::ordered(a, b).map(|ord| ord.is_lt()).unwrap_or(false)
            }),
            Predicate::Le(value) => Self::compare_field(row, field, value, |a, b| {
                Self::ordered(a, b).map(|ord| ord.is_le()).unwrap_or(false)
            }),
            Predicate::Gt(value) => Self::compare_field(row, field, value, |a, b| {
                Self::ordered(a, b).map(|ord| ord.is_gt()).unwrap_or(false)
            }),
            Predicate::Ge(value) => Self::compare_field(row, field, value, |a, b| {
                Self::ordered(a, b).map(|ord| ord.is_ge()).unwrap_or(false)
            }),
            Predicate::In(values) => match row.get(field) {
                Some(fv) => values.iter().any(|v| fv.loosely_eq(v)),
                None => false,
            },
            Predicate::NotIn(values) => match row.get(field) {
                Some(fv) => !values.iter().any(|v| fv.loosely_eq(v)),
                None => true,
            },
            Predicate::IsNull => matches!(row.get(field), None | Some(Value::Null)),
            Predicate::IsNotNull => !matches!(row.get(field), None | Some(Value::Null)),
            Predicate::Like(pattern) => match row.get(field) {
                Some(Value::String(s)) => Self::like_match(s, pattern),
                _ => false,
            },
            Predicate::NotLike(pattern) => match row.get(field) {
                Some(Value::String(s)) => !Self::like_match(s, pattern),
                _ => true,
            },
            Predicate::Related(nested) => row
                .relation(field)
                .is_some_and(|related| related.iter().any(|r| Self::evaluate_conditions(nested, r))),
        }
    }

    /// Compare a field value with a comparator function.
    fn compare_field<F>(row: &Entity, field: &str, value: &Value, comparator: F) -> bool
    where
        F: FnOnce(&Value, &Value) -> bool,
    {
        match row.get(field) {
            Some(fv) => comparator(fv, value),
            None => false,
        }
    }

    /// Ordering of two non-null values.
    fn ordered(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
        if a.is_null() || b.is_null() {
            return None;
        }
        a.compare(b)
    }

    /// Match a string against a SQL LIKE pattern.
    ///
    /// Supports:
    /// - `%` matches zero or more characters
    /// - `_` matches exactly one character
    /// - `\\%` and `\\_` match the literal character
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let value: Vec<char> = value.chars().collect();
        let pattern: Vec<char> = pattern.chars().collect();
        Self::like_match_from(&value, &pattern)
    }

    fn like_match_from(value: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => {
                if rest.is_empty() {
                    return true;
                }
                (0..=value.len()).any(|skip| Self::like_match_from(&value[skip..], rest))
            }
            Some(('_', rest)) => !value.is_empty() && Self::like_match_from(&value[1..], rest),
            Some(('\\', rest)) => match (rest.split_first(), value.split_first()) {
                (Some((p, rest)), Some((c, tail))) if p == c => Self::like_match_from(tail, rest),
                _ => false,
            },
            Some((p, rest)) => match value.split_first() {
                Some((c, tail)) if c == p => Self::like_match_from(tail, rest),
                _ => false,
            },
        }
    }
}
