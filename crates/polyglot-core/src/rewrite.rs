//! Language-context query rewriting.
//!
//! Logical translatable field names in where clauses, orderings, projections
//! and groupings are replaced with the physical column of the current
//! language. Without a language, every input is returned unchanged.

use crate::catalog::SchemaBundle;
use crate::error::{Error, Result};
use crate::registry::FieldRegistry;
use polyglot_proto::{Condition, Conditions, FindWhere, OrderSpec, Predicate};

/// Rewrites column references for a language context.
pub struct QueryRewriter<'a> {
    registry: &'a FieldRegistry,
    schema: Option<&'a SchemaBundle>,
}

impl<'a> QueryRewriter<'a> {
    /// Create a rewriter over a registry.
    pub fn new(registry: &'a FieldRegistry) -> Self {
        Self {
            registry,
            schema: None,
        }
    }

    /// Use a schema to follow relations in nested clauses and column paths.
    pub fn with_schema(mut self, schema: &'a SchemaBundle) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Physical column of `field` for `language` (the default language when
    /// unset). Fields that are not translatable map to themselves.
    pub fn language_column(
        &self,
        entity: &str,
        field: &str,
        language: Option<&str>,
    ) -> Result<String> {
        match self.registry.require(entity, field)? {
            Some(spec) => spec.column_for(language.unwrap_or(spec.default_language())),
            None => Ok(field.to_string()),
        }
    }

    /// Rewrite one column reference, optionally prefixed by a relation path
    /// (`category.title`).
    pub fn rewrite_column(
        &self,
        entity: &str,
        column: &str,
        language: Option<&str>,
    ) -> Result<String> {
        let Some(language) = language else {
            return Ok(column.to_string());
        };

        match column.rsplit_once('.') {
            Some((path, field)) => {
                let target = self.follow_path(entity, path)?;
                let rewritten = self.language_column(&target, field, Some(language))?;
                Ok(format!("{path}.{rewritten}"))
            }
            None => self.language_column(entity, column, Some(language)),
        }
    }

    /// Rewrite a where clause. Each OR group is rewritten independently and
    /// nested relation clauses use the related entity's own fields.
    pub fn rewrite_where(
        &self,
        filter: &FindWhere,
        entity: &str,
        language: Option<&str>,
    ) -> Result<FindWhere> {
        if language.is_none() {
            return Ok(filter.clone());
        }
        filter.try_map(|conditions| self.rewrite_conditions(conditions, entity, language))
    }

    /// Rewrite one condition object.
    pub fn rewrite_conditions(
        &self,
        conditions: &Conditions,
        entity: &str,
        language: Option<&str>,
    ) -> Result<Conditions> {
        if language.is_none() {
            return Ok(conditions.clone());
        }

        let mut out = Conditions::new();
        for Condition { field, predicate } in conditions.iter() {
            let condition = match predicate {
                Predicate::Related(nested) => {
                    let target = self.follow_path(entity, field)?;
                    Condition {
                        field: field.clone(),
                        predicate: Predicate::Related(
                            self.rewrite_conditions(nested, &target, language)?,
                        ),
                    }
                }
                other => Condition {
                    field: self.language_column(entity, field, language)?,
                    predicate: other.clone(),
                },
            };
            out = out.with(condition.field, condition.predicate);
        }
        Ok(out)
    }

    /// Rewrite an ordering.
    pub fn rewrite_order(
        &self,
        order: &[OrderSpec],
        entity: &str,
        language: Option<&str>,
    ) -> Result<Vec<OrderSpec>> {
        order
            .iter()
            .map(|spec| {
                Ok(OrderSpec {
                    field: self.rewrite_column(entity, &spec.field, language)?,
                    direction: spec.direction,
                })
            })
            .collect()
    }

    /// Rewrite a projection or grouping column list.
    pub fn rewrite_select_columns(
        &self,
        columns: &[String],
        entity: &str,
        language: Option<&str>,
    ) -> Result<Vec<String>> {
        columns
            .iter()
            .map(|column| self.rewrite_column(entity, column, language))
            .collect()
    }

    fn follow_path(&self, entity: &str, path: &str) -> Result<String> {
        let unknown = || Error::UnknownRelation {
            entity: entity.to_string(),
            relation: path.to_string(),
        };
        let schema = self.schema.ok_or_else(unknown)?;
        schema
            .resolve_path(entity, path)
            .map(str::to_string)
            .ok_or_else(unknown)
    }
}
