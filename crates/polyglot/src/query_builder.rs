//! Alias-based query builder.
//!
//! Columns are written `alias.column`, where the alias is the root alias
//! given to [`Repository::create_query_builder`] or one introduced by
//! [`QueryBuilder::left_join_and_select`]. Column names are rewritten to the
//! builder's current language as each clause is added, so a language change
//! only affects clauses added after it.

use crate::error::{Error, Result};
use crate::repository::Repository;
use polyglot_core::proto::{Conditions, FindOptions, FindWhere, OrderDirection, OrderSpec};
use polyglot_core::{Backend, Entity, LanguageContext};
use std::collections::BTreeMap;
use tracing::instrument;

/// A query over one entity type and its joined relations.
pub struct QueryBuilder<B: Backend> {
    repository: Repository<B>,
    alias: String,
    context: LanguageContext,
    /// Joined alias → relation path from the root.
    joins: BTreeMap<String, String>,
    /// Condition groups, OR-ed together.
    groups: Vec<Conditions>,
    order_by: Vec<OrderSpec>,
    select: Vec<String>,
    group_by: Vec<String>,
    relations: Vec<String>,
    skip: Option<u32>,
    take: Option<u32>,
}

impl<B: Backend> QueryBuilder<B> {
    pub(crate) fn new(repository: Repository<B>, alias: &str) -> Self {
        let mut context = LanguageContext::new();
        if let Some(language) = repository.get_language() {
            context.set(language);
        }
        Self {
            repository,
            alias: alias.to_string(),
            context,
            joins: BTreeMap::new(),
            groups: Vec::new(),
            order_by: Vec::new(),
            select: Vec::new(),
            group_by: Vec::new(),
            relations: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Set the language for clauses added from now on and for decoding the
    /// results.
    pub fn set_language(mut self, language: &str) -> Self {
        self.context.set(language);
        self
    }

    /// The builder's current language, if set.
    pub fn get_language(&self) -> Option<&str> {
        self.context.get()
    }

    /// Replace the where clause.
    pub fn where_(mut self, conditions: Conditions) -> Result<Self, B::Error> {
        let conditions = self.rewrite_conditions(conditions)?;
        self.groups = vec![conditions];
        Ok(self)
    }

    /// AND a condition object into every OR group.
    pub fn and_where(mut self, conditions: Conditions) -> Result<Self, B::Error> {
        let conditions = self.rewrite_conditions(conditions)?;
        if self.groups.is_empty() {
            self.groups.push(conditions);
        } else {
            for group in self.groups.iter_mut() {
                group.extend(conditions.clone());
            }
        }
        Ok(self)
    }

    /// OR a condition object with the existing clause.
    pub fn or_where(mut self, conditions: Conditions) -> Result<Self, B::Error> {
        let conditions = self.rewrite_conditions(conditions)?;
        self.groups.push(conditions);
        Ok(self)
    }

    /// Replace the ordering.
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Result<Self, B::Error> {
        self.order_by.clear();
        self.add_order_by(column, direction)
    }

    /// Append an ordering.
    pub fn add_order_by(
        mut self,
        column: &str,
        direction: OrderDirection,
    ) -> Result<Self, B::Error> {
        let field = self.rewrite_column(column)?;
        self.order_by.push(OrderSpec { field, direction });
        Ok(self)
    }

    /// Replace the projection.
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self, B::Error> {
        self.select.clear();
        self.add_select(columns)
    }

    /// Append columns to the projection.
    pub fn add_select<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self, B::Error> {
        for column in columns {
            let column = self.rewrite_column(column.as_ref())?;
            self.select.push(column);
        }
        Ok(self)
    }

    /// Replace the grouping.
    pub fn group_by(mut self, column: &str) -> Result<Self, B::Error> {
        self.group_by.clear();
        self.add_group_by(column)
    }

    /// Append a grouping column.
    pub fn add_group_by(mut self, column: &str) -> Result<Self, B::Error> {
        let column = self.rewrite_column(column)?;
        self.group_by.push(column);
        Ok(self)
    }

    /// Load the relation `parent_alias.relation` and name it `alias`.
    pub fn left_join_and_select(mut self, path: &str, alias: &str) -> Result<Self, B::Error> {
        let (parent, relation) = path.split_once('.').ok_or_else(|| Error::UnknownAlias {
            alias: path.to_string(),
        })?;
        let parent_path = self.alias_path(parent)?;
        let full_path = if parent_path.is_empty() {
            relation.to_string()
        } else {
            format!("{parent_path}.{relation}")
        };

        let root = self.repository.entity_type();
        let known = self
            .repository
            .backend()
            .schema()
            .is_some_and(|schema| schema.resolve_path(root, &full_path).is_some());
        if !known {
            return Err(Error::I18n(polyglot_core::Error::UnknownRelation {
                entity: root.to_string(),
                relation: full_path,
            }));
        }

        self.joins.insert(alias.to_string(), full_path.clone());
        self.relations.push(full_path);
        Ok(self)
    }

    /// Skip the first `skip` results.
    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `take` results.
    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    /// The find request this builder describes.
    pub fn to_options(&self) -> FindOptions {
        let filter = match self.groups.len() {
            0 => None,
            1 => Some(FindWhere::All(self.groups[0].clone())),
            _ => Some(FindWhere::Any(self.groups.clone())),
        };
        FindOptions {
            filter,
            order_by: self.order_by.clone(),
            select: self.select.clone(),
            group_by: self.group_by.clone(),
            relations: self.relations.clone(),
            skip: self.skip,
            take: self.take,
        }
    }

    /// Fetch every matching entity.
    #[instrument(skip(self), fields(entity = %self.repository.entity_type(), alias = %self.alias))]
    pub async fn get_many(&self) -> Result<Vec<Entity>, B::Error> {
        self.repository
            .fetch(&self.to_options(), self.get_language())
            .await
    }

    /// Fetch the first matching entity.
    pub async fn get_one(&self) -> Result<Option<Entity>, B::Error> {
        let mut options = self.to_options();
        options.take = Some(1);
        Ok(self
            .repository
            .fetch(&options, self.get_language())
            .await?
            .into_iter()
            .next())
    }

    /// Fetch the first matching entity or fail with
    /// [`Error::EntityNotFound`].
    pub async fn get_one_or_fail(&self) -> Result<Entity, B::Error> {
        self.get_one().await?.ok_or_else(|| Error::EntityNotFound {
            entity: self.repository.entity_type().to_string(),
        })
    }

    /// Count the matching entities, ignoring paging.
    pub async fn get_count(&self) -> Result<u64, B::Error> {
        let options = self.to_options();
        self.repository
            .backend()
            .count(self.repository.entity_type(), options.filter.as_ref())
            .await
            .map_err(Error::Backend)
    }

    /// Relation path of an alias (empty for the root alias).
    fn alias_path(&self, alias: &str) -> Result<String, B::Error> {
        if alias == self.alias {
            return Ok(String::new());
        }
        self.joins
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::UnknownAlias {
                alias: alias.to_string(),
            })
    }

    /// Split `alias.column` into a relation path and a column. A bare column
    /// belongs to the root alias.
    fn split_column<'c>(&self, column: &'c str) -> Result<(String, &'c str), B::Error> {
        match column.split_once('.') {
            Some((alias, column)) => Ok((self.alias_path(alias)?, column)),
            None => Ok((String::new(), column)),
        }
    }

    /// Map `alias.column` to `path.physical_column`.
    fn rewrite_column(&self, column: &str) -> Result<String, B::Error> {
        let (path, column) = self.split_column(column)?;
        let qualified = if path.is_empty() {
            column.to_string()
        } else {
            format!("{path}.{column}")
        };

        let schema = self.repository.backend().schema();
        Ok(self.repository.rewriter(schema.as_deref()).rewrite_column(
            self.repository.entity_type(),
            &qualified,
            self.get_language(),
        )?)
    }

    /// Move conditions on joined aliases under nested relation clauses, then
    /// rewrite the whole condition object from the root entity.
    fn rewrite_conditions(&self, conditions: Conditions) -> Result<Conditions, B::Error> {
        let mut root = Conditions::new();
        let mut nested: BTreeMap<String, Conditions> = BTreeMap::new();

        for condition in conditions.iter() {
            let (path, field) = self.split_column(&condition.field)?;
            if path.is_empty() {
                root = root.with(field, condition.predicate.clone());
            } else {
                let group = nested.remove(&path).unwrap_or_default();
                nested.insert(path, group.with(field, condition.predicate.clone()));
            }
        }

        for (path, conditions) in nested {
            root.extend(nest(&path, conditions));
        }

        let schema = self.repository.backend().schema();
        Ok(self.repository.rewriter(schema.as_deref()).rewrite_conditions(
            &root,
            self.repository.entity_type(),
            self.get_language(),
        )?)
    }
}

/// Wrap `conditions` in one nested relation clause per path segment.
fn nest(path: &str, conditions: Conditions) -> Conditions {
    path.rsplit('.')
        .fold(conditions, |inner, relation| Conditions::new().related(relation, inner))
}
