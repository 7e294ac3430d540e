//! Entity (de)composition.
//!
//! After load, per-language physical columns are folded into a
//! [`MultilingualValue`] per translatable field and the logical field is set
//! to the value of the current language. Before save, the translations view
//! (or a scalar edit) is flattened back into physical columns.
//!
//! Save policy for one field, first match wins:
//! 1. the translations view changed since load (or is present on a new
//!    entity): write the languages that changed (every configured language on
//!    a new entity, missing ones as null);
//! 2. the scalar changed: write it to the column of the entity's language
//!    (the default language when unset);
//! 3. otherwise write nothing.

use crate::entity::{Entity, MultilingualValue};
use crate::error::{Error, Result};
use crate::language::normalize_language;
use crate::registry::{FieldI18nSpec, FieldRegistry};
use polyglot_proto::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Physical column → value pairs to persist.
pub type ColumnPatch = BTreeMap<String, Value>;

/// How a translatable field changed since load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldChange {
    Translations,
    Scalar,
    Unchanged,
}

/// Folds and unfolds translatable fields of entities.
pub struct Decomposer<'a> {
    registry: &'a FieldRegistry,
}

impl<'a> Decomposer<'a> {
    /// Create a decomposer over a registry.
    pub fn new(registry: &'a FieldRegistry) -> Self {
        Self { registry }
    }

    /// Apply the after-load transform to an entity and its loaded relations.
    ///
    /// Missing language columns become null translations. With no language,
    /// each logical field holds its default-language value; with a language
    /// the field does not support, it holds null.
    pub fn decompose(&self, entity: &mut Entity, language: Option<&str>) -> Result<()> {
        let language = language.map(normalize_language);
        let specs = self.registry.specs_for(entity.entity_type())?;

        for spec in &specs {
            let mut value = MultilingualValue::new();
            for (lang, column) in spec.columns() {
                let stored = if lang == spec.default_language() {
                    entity.get(&column).cloned()
                } else {
                    entity.remove(&column)
                };
                value.set(lang, stored.unwrap_or(Value::Null));
            }

            let current = language.as_deref().unwrap_or(spec.default_language());
            let scalar = value.get(current).cloned().unwrap_or(Value::Null);
            entity.set(spec.field(), scalar);
            entity.set_translations(spec.field(), value);
        }

        entity.set_language(language.as_deref());
        entity.take_snapshot();

        for related in entity.relations_mut() {
            for child in related.iter_mut() {
                self.decompose(child, language.as_deref())?;
            }
        }
        Ok(())
    }

    /// Decompose every entity of a result set.
    pub fn decompose_all(&self, entities: &mut [Entity], language: Option<&str>) -> Result<()> {
        for entity in entities.iter_mut() {
            self.decompose(entity, language)?;
        }
        Ok(())
    }

    /// Compute the physical columns to write for the translatable fields of
    /// an entity.
    pub fn flatten_for_save(&self, entity: &Entity) -> Result<ColumnPatch> {
        let mut patch = ColumnPatch::new();
        for spec in self.registry.specs_for(entity.entity_type())? {
            self.flatten_field(entity, &spec, &mut patch)?;
        }
        trace!(
            entity = entity.entity_type(),
            columns = patch.len(),
            "Flattened translatable fields"
        );
        Ok(patch)
    }

    /// Full row for an insert: plain columns plus translatable columns.
    pub fn write_row(&self, entity: &Entity) -> Result<BTreeMap<String, Value>> {
        let specs = self.registry.specs_for(entity.entity_type())?;
        let mut row: BTreeMap<String, Value> = entity
            .columns()
            .iter()
            .filter(|(column, _)| !specs.iter().any(|s| s.field() == column.as_str()))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        row.extend(self.flatten_for_save(entity)?);
        Ok(row)
    }

    /// Columns changed since load, for an update.
    ///
    /// Only the columns that differ from the load snapshot are returned, so
    /// the update leaves other languages' columns out of the write. Applying
    /// the patch atomically is up to the backend.
    pub fn changed_row(&self, entity: &Entity) -> Result<BTreeMap<String, Value>> {
        let Some(snapshot) = entity.snapshot.as_ref() else {
            return self.write_row(entity);
        };

        let specs = self.registry.specs_for(entity.entity_type())?;
        let mut row: BTreeMap<String, Value> = entity
            .columns()
            .iter()
            .filter(|(column, _)| !specs.iter().any(|s| s.field() == column.as_str()))
            .filter(|(column, value)| snapshot.columns.get(column.as_str()) != Some(*value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        row.extend(self.flatten_for_save(entity)?);
        Ok(row)
    }

    /// Re-align scalars and translations views with what was just persisted
    /// and refresh the load snapshot.
    pub fn sync_after_save(&self, entity: &mut Entity) -> Result<()> {
        let specs = self.registry.specs_for(entity.entity_type())?;

        for spec in &specs {
            let current = entity
                .language()
                .unwrap_or(spec.default_language())
                .to_string();

            match field_change(entity, spec) {
                FieldChange::Translations => {
                    let view = full_view(spec, entity.translations(spec.field()));
                    let scalar = view.get(&current).cloned().unwrap_or(Value::Null);
                    entity.set(spec.field(), scalar);
                    entity.set_translations(spec.field(), view);
                }
                FieldChange::Scalar => {
                    let scalar = entity.get(spec.field()).cloned().unwrap_or(Value::Null);
                    let base = entity
                        .snapshot
                        .as_ref()
                        .and_then(|s| s.translations.get(spec.field()));
                    let mut view = full_view(spec, base);
                    view.set(&current, scalar);
                    entity.set_translations(spec.field(), view);
                }
                FieldChange::Unchanged => {}
            }
        }

        entity.take_snapshot();
        Ok(())
    }

    fn flatten_field(
        &self,
        entity: &Entity,
        spec: &Arc<FieldI18nSpec>,
        patch: &mut ColumnPatch,
    ) -> Result<()> {
        let field = spec.field();

        match field_change(entity, spec) {
            FieldChange::Translations => {
                let Some(view) = entity.translations(field) else {
                    return Ok(());
                };
                if let Some(language) = view.languages().find(|l| !spec.contains(l)) {
                    return Err(Error::ColumnResolution {
                        entity: spec.entity().to_string(),
                        field: field.to_string(),
                        language: language.to_string(),
                    });
                }

                let before = entity
                    .snapshot
                    .as_ref()
                    .and_then(|s| s.translations.get(field));
                for (language, column) in spec.columns() {
                    let value = view.get(language).cloned().unwrap_or(Value::Null);
                    let unchanged = before.is_some_and(|b| {
                        b.get(language).cloned().unwrap_or(Value::Null) == value
                    });
                    if !unchanged {
                        patch.insert(column, value);
                    }
                }
            }
            FieldChange::Scalar => {
                let language = entity.language().unwrap_or(spec.default_language());
                let column = spec.column_for(language)?;
                let value = entity.get(field).cloned().unwrap_or(Value::Null);
                patch.insert(column, value);
            }
            FieldChange::Unchanged => {}
        }
        Ok(())
    }
}

fn field_change(entity: &Entity, spec: &FieldI18nSpec) -> FieldChange {
    let field = spec.field();
    let view = entity.translations(field);

    match entity.snapshot.as_ref() {
        None => {
            if view.is_some() {
                FieldChange::Translations
            } else if entity.get(field).is_some() {
                FieldChange::Scalar
            } else {
                FieldChange::Unchanged
            }
        }
        Some(snapshot) => {
            if view.is_some() && view != snapshot.translations.get(field) {
                FieldChange::Translations
            } else if entity.get(field).unwrap_or(&Value::Null)
                != snapshot.columns.get(field).unwrap_or(&Value::Null)
            {
                FieldChange::Scalar
            } else {
                FieldChange::Unchanged
            }
        }
    }
}

/// A translations view holding exactly the configured languages.
fn full_view(spec: &FieldI18nSpec, view: Option<&MultilingualValue>) -> MultilingualValue {
    spec.languages()
        .iter()
        .map(|language| {
            let value = view
                .and_then(|v| v.get(language))
                .cloned()
                .unwrap_or(Value::Null);
            (language.as_str(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Related;
    use crate::registry::I18nOptions;
    use pretty_assertions::assert_eq;

    fn registry() -> FieldRegistry {
        let registry = FieldRegistry::new();
        registry
            .declare(
                "Product",
                "name",
                I18nOptions::new()
                    .with_languages(["en", "es", "fr"])
                    .with_default_language("en"),
            )
            .unwrap();
        registry
            .declare(
                "Category",
                "title",
                I18nOptions::new()
                    .with_languages(["en", "fr"])
                    .with_default_language("en"),
            )
            .unwrap();
        registry
    }

    fn product_row() -> Entity {
        Entity::new("Product")
            .with("id", 1i64)
            .with("price", 10i64)
            .with("name", "Laptop")
            .with("name_es", "Portátil")
            .with("name_fr", Value::Null)
    }

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_decompose_without_language() {
        let registry = registry();
        let mut entity = product_row();
        Decomposer::new(&registry).decompose(&mut entity, None).unwrap();

        assert_eq!(entity.get("name"), Some(&Value::from("Laptop")));
        assert!(entity.get("name_es").is_none());
        assert!(entity.get("name_fr").is_none());

        let view = entity.translations("name").unwrap();
        assert_eq!(view.get("es"), Some(&Value::from("Portátil")));
        assert_eq!(view.get("fr"), Some(&Value::Null));
        assert_eq!(view.len(), 3);
        assert_eq!(entity.language(), None);
        assert!(entity.is_loaded());
    }

    #[test]
    fn test_decompose_with_language() {
        let registry = registry();
        let mut entity = product_row();
        Decomposer::new(&registry)
            .decompose(&mut entity, Some("ES"))
            .unwrap();

        assert_eq!(entity.get("name"), Some(&Value::from("Portátil")));
        assert_eq!(entity.language(), Some("es"));
        assert_eq!(
            entity.translations("name").unwrap().get("en"),
            Some(&Value::from("Laptop"))
        );
    }

    #[test]
    fn test_decompose_missing_columns_become_null() {
        let registry = registry();
        let mut entity = Entity::new("Product").with("id", 1i64).with("name", "Laptop");
        Decomposer::new(&registry)
            .decompose(&mut entity, Some("fr"))
            .unwrap();

        assert_eq!(entity.get("name"), Some(&Value::Null));
        let view = entity.translations("name").unwrap();
        assert_eq!(view.get("es"), Some(&Value::Null));
        assert_eq!(view.get("fr"), Some(&Value::Null));
    }

    #[test]
    fn test_decompose_unconfigured_language_gives_null() {
        let registry = registry();
        let mut entity = product_row();
        Decomposer::new(&registry)
            .decompose(&mut entity, Some("de"))
            .unwrap();

        assert_eq!(entity.get("name"), Some(&Value::Null));
        assert_eq!(entity.translations("name").unwrap().len(), 3);
    }

    #[test]
    fn test_decompose_recurses_through_plain_root() {
        let registry = registry();
        let category = Entity::from_row(
            "Category",
            row(&[
                ("id", Value::Int64(7)),
                ("title", Value::from("Computers")),
                ("title_fr", Value::from("Ordinateurs")),
            ]),
        );
        let mut product = product_row();
        product.set_relation("category", Related::One(Box::new(category)));

        let mut order = Entity::new("Order").with("id", 99i64);
        order.set_relation("products", Related::Many(vec![product]));

        Decomposer::new(&registry)
            .decompose(&mut order, Some("fr"))
            .unwrap();

        let products = order.relation("products").unwrap().as_many().unwrap();
        assert_eq!(products[0].get("name"), Some(&Value::Null));
        let category = products[0].relation("category").unwrap().as_one().unwrap();
        assert_eq!(category.get("title"), Some(&Value::from("Ordinateurs")));
        assert_eq!(category.language(), Some("fr"));
    }

    #[test]
    fn test_flatten_new_entity_full_map_with_nulls() {
        let registry = registry();
        let entity = Entity::new("Product").with_translations(
            "name",
            MultilingualValue::new().with("en", "Laptop").with("fr", "Ordinateur"),
        );

        let patch = Decomposer::new(&registry).flatten_for_save(&entity).unwrap();
        assert_eq!(
            patch,
            row(&[
                ("name", Value::from("Laptop")),
                ("name_es", Value::Null),
                ("name_fr", Value::from("Ordinateur")),
            ])
        );
    }

    #[test]
    fn test_flatten_new_entity_scalar_uses_language() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);

        let entity = Entity::new("Product").with("name", "Laptop");
        assert_eq!(
            decomposer.flatten_for_save(&entity).unwrap(),
            row(&[("name", Value::from("Laptop"))])
        );

        let entity = Entity::new("Product").with("name", "Portátil").with_language("es");
        assert_eq!(
            decomposer.flatten_for_save(&entity).unwrap(),
            row(&[("name_es", Value::from("Portátil"))])
        );
    }

    #[test]
    fn test_flatten_loaded_entity_only_changed_languages() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);
        let mut entity = product_row();
        decomposer.decompose(&mut entity, None).unwrap();

        assert!(decomposer.flatten_for_save(&entity).unwrap().is_empty());

        entity
            .translations_mut("name")
            .unwrap()
            .set("fr", "Ordinateur");
        entity.translations_mut("name").unwrap().remove("es");

        let patch = decomposer.flatten_for_save(&entity).unwrap();
        assert_eq!(
            patch,
            row(&[("name_es", Value::Null), ("name_fr", Value::from("Ordinateur"))])
        );
    }

    #[test]
    fn test_flatten_scalar_edit_targets_loaded_language() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);
        let mut entity = product_row();
        decomposer.decompose(&mut entity, Some("es")).unwrap();

        entity.set("name", "Portátil nuevo");
        let patch = decomposer.flatten_for_save(&entity).unwrap();
        assert_eq!(patch, row(&[("name_es", Value::from("Portátil nuevo"))]));
    }

    #[test]
    fn test_translations_win_over_scalar() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);
        let mut entity = product_row();
        decomposer.decompose(&mut entity, Some("es")).unwrap();

        entity.set("name", "ignored");
        entity.set_translation("name", "en", "Notebook");

        let patch = decomposer.flatten_for_save(&entity).unwrap();
        assert_eq!(patch, row(&[("name", Value::from("Notebook"))]));
    }

    #[test]
    fn test_flatten_unknown_language_key() {
        let registry = registry();
        let entity = Entity::new("Product")
            .with_translations("name", MultilingualValue::new().with("de", "Rechner"));

        let err = Decomposer::new(&registry).flatten_for_save(&entity).unwrap_err();
        assert!(matches!(err, Error::ColumnResolution { ref language, .. } if language == "de"));
    }

    #[test]
    fn test_flatten_scalar_under_unconfigured_language() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);
        let mut entity = product_row();
        decomposer.decompose(&mut entity, Some("de")).unwrap();

        entity.set("name", "Rechner");
        assert!(matches!(
            decomposer.flatten_for_save(&entity),
            Err(Error::ColumnResolution { .. })
        ));
    }

    #[test]
    fn test_decompose_flatten_round_trip() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);

        let original = Entity::new("Product").with("id", 1i64).with_translations(
            "name",
            MultilingualValue::new().with("en", "Laptop").with("es", "Portátil"),
        );
        let stored = decomposer.write_row(&original).unwrap();

        let mut loaded = Entity::from_row("Product", stored);
        decomposer.decompose(&mut loaded, None).unwrap();

        let view = loaded.translations("name").unwrap();
        assert_eq!(view.get("en"), Some(&Value::from("Laptop")));
        assert_eq!(view.get("es"), Some(&Value::from("Portátil")));
        assert_eq!(view.get("fr"), Some(&Value::Null));
    }

    #[test]
    fn test_write_row_and_changed_row() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);

        let entity = Entity::new("Product").with("price", 5i64).with("name", "Laptop");
        assert_eq!(
            decomposer.write_row(&entity).unwrap(),
            row(&[("name", Value::from("Laptop")), ("price", Value::Int64(5))])
        );

        let mut loaded = product_row();
        decomposer.decompose(&mut loaded, Some("fr")).unwrap();
        assert!(decomposer.changed_row(&loaded).unwrap().is_empty());

        loaded.set("price", 12i64);
        loaded.set("name", "Ordinateur");
        assert_eq!(
            decomposer.changed_row(&loaded).unwrap(),
            row(&[
                ("name_fr", Value::from("Ordinateur")),
                ("price", Value::Int64(12)),
            ])
        );
    }

    #[test]
    fn test_sync_after_save() {
        let registry = registry();
        let decomposer = Decomposer::new(&registry);

        let mut entity = Entity::new("Product")
            .with("name", "Portátil")
            .with_language("es");
        decomposer.sync_after_save(&mut entity).unwrap();

        let view = entity.translations("name").unwrap();
        assert_eq!(view.get("es"), Some(&Value::from("Portátil")));
        assert_eq!(view.get("en"), Some(&Value::Null));
        assert!(decomposer.flatten_for_save(&entity).unwrap().is_empty());

        entity.set_translation("name", "es", "Portátil 2");
        decomposer.sync_after_save(&mut entity).unwrap();
        assert_eq!(entity.get("name"), Some(&Value::from("Portátil 2")));
        assert!(decomposer.flatten_for_save(&entity).unwrap().is_empty());
    }

    #[test]
    fn test_pending_field_fails_fast() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();

        let decomposer = Decomposer::new(&registry);
        let mut entity = product_row();
        assert!(matches!(
            decomposer.decompose(&mut entity, None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            decomposer.flatten_for_save(&entity),
            Err(Error::Configuration(_))
        ));
    }
}
