//! Entities as loaded from and persisted to a backend.

use crate::language::normalize_language;
use polyglot_proto::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language → value map of one translatable field.
///
/// Keys are normalized language codes. After load, the keys are exactly the
/// field's configured languages and missing translations hold
/// [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultilingualValue {
    values: BTreeMap<String, Value>,
}

impl MultilingualValue {
    /// Create an empty value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translation.
    pub fn with(mut self, language: &str, value: impl Into<Value>) -> Self {
        self.set(language, value);
        self
    }

    /// Set the translation for a language.
    pub fn set(&mut self, language: &str, value: impl Into<Value>) {
        self.values.insert(normalize_language(language), value.into());
    }

    /// Get the translation for a language.
    pub fn get(&self, language: &str) -> Option<&Value> {
        self.values.get(&normalize_language(language))
    }

    /// Remove the translation for a language.
    pub fn remove(&mut self, language: &str) -> Option<Value> {
        self.values.remove(&normalize_language(language))
    }

    /// Check whether a language is present (even if its value is null).
    pub fn contains(&self, language: &str) -> bool {
        self.values.contains_key(&normalize_language(language))
    }

    /// Languages present, sorted.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(language, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of languages present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether no language is present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build from a JSON object of language → scalar.
    ///
    /// Returns `None` for non-objects or nested values.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let object = json.as_object()?;
        let mut out = MultilingualValue::new();
        for (language, value) in object {
            out.set(language, Value::from_json(value)?);
        }
        Some(out)
    }
}

impl<S: AsRef<str>, V: Into<Value>> FromIterator<(S, V)> for MultilingualValue {
    fn from_iter<T: IntoIterator<Item = (S, V)>>(iter: T) -> Self {
        let mut out = MultilingualValue::new();
        for (language, value) in iter {
            out.set(language.as_ref(), value);
        }
        out
    }
}

/// Loaded related entities.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A single related entity.
    One(Box<Entity>),
    /// A list of related entities.
    Many(Vec<Entity>),
    /// A to-one relation with no target.
    Null,
}

impl Related {
    /// Iterate over the related entities.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Entity> + '_> {
        match self {
            Related::One(entity) => Box::new(std::iter::once(entity.as_ref())),
            Related::Many(entities) => Box::new(entities.iter()),
            Related::Null => Box::new(std::iter::empty()),
        }
    }

    /// Iterate mutably over the related entities.
    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut Entity> + '_> {
        match self {
            Related::One(entity) => Box::new(std::iter::once(entity.as_mut())),
            Related::Many(entities) => Box::new(entities.iter_mut()),
            Related::Null => Box::new(std::iter::empty()),
        }
    }

    /// The single related entity, if this is a to-one relation with a target.
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            Related::One(entity) => Some(entity),
            _ => None,
        }
    }

    /// The related list, if this is a to-many relation.
    pub fn as_many(&self) -> Option<&[Entity]> {
        match self {
            Related::Many(entities) => Some(entities),
            _ => None,
        }
    }
}

/// Column and translation state captured when an entity was loaded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    pub(crate) columns: BTreeMap<String, Value>,
    pub(crate) translations: BTreeMap<String, MultilingualValue>,
}

/// A row of an entity type, with its loaded relations.
///
/// Straight out of a backend, `columns` holds physical column names. After
/// decomposition, each translatable field appears in `columns` under its
/// logical name (holding the current-language value) and in the
/// translations view.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    entity_type: String,
    columns: BTreeMap<String, Value>,
    translations: BTreeMap<String, MultilingualValue>,
    relations: BTreeMap<String, Related>,
    language: Option<String>,
    pub(crate) snapshot: Option<Snapshot>,
}

impl Entity {
    /// Create a new, unsaved entity.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            columns: BTreeMap::new(),
            translations: BTreeMap::new(),
            relations: BTreeMap::new(),
            language: None,
            snapshot: None,
        }
    }

    /// Create an entity from backend row data.
    pub fn from_row(entity_type: impl Into<String>, columns: BTreeMap<String, Value>) -> Self {
        Self {
            columns,
            ..Self::new(entity_type)
        }
    }

    /// Set a column value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set the translations of a field.
    pub fn with_translations(mut self, field: impl Into<String>, value: MultilingualValue) -> Self {
        self.set_translations(field, value);
        self
    }

    /// Set the language the scalar fields are expressed in.
    pub fn with_language(mut self, language: &str) -> Self {
        self.set_language(Some(language));
        self
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Remove a column value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    /// All column values.
    pub fn columns(&self) -> &BTreeMap<String, Value> {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.columns
    }

    /// The translations view of a field.
    pub fn translations(&self, field: &str) -> Option<&MultilingualValue> {
        self.translations.get(field)
    }

    /// Mutable translations view of a field.
    pub fn translations_mut(&mut self, field: &str) -> Option<&mut MultilingualValue> {
        self.translations.get_mut(field)
    }

    /// All translations views.
    pub fn all_translations(&self) -> &BTreeMap<String, MultilingualValue> {
        &self.translations
    }

    /// Replace the translations view of a field.
    pub fn set_translations(&mut self, field: impl Into<String>, value: MultilingualValue) {
        self.translations.insert(field.into(), value);
    }

    /// Set one translation of a field, creating the view if needed.
    pub fn set_translation(&mut self, field: &str, language: &str, value: impl Into<Value>) {
        self.translations
            .entry(field.to_string())
            .or_default()
            .set(language, value);
    }

    /// Loaded relation by name.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Mutable loaded relation by name.
    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    /// All loaded relations.
    pub fn relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    pub(crate) fn relations_mut(&mut self) -> impl Iterator<Item = &mut Related> {
        self.relations.values_mut()
    }

    /// Attach loaded related entities.
    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Detach a loaded relation.
    pub fn remove_relation(&mut self, name: &str) -> Option<Related> {
        self.relations.remove(name)
    }

    /// Keep only the columns for which `keep` returns true.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.columns.retain(|column, _| keep(column));
    }

    /// The language captured at load time or set by the caller.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Set (or clear) the language the scalar fields are expressed in.
    pub fn set_language(&mut self, language: Option<&str>) {
        self.language = language.map(normalize_language);
    }

    /// Check whether the entity came from a backend (or has been saved).
    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn take_snapshot(&mut self) {
        self.snapshot = Some(Snapshot {
            columns: self.columns.clone(),
            translations: self.translations.clone(),
        });
    }
}
