//! Field configuration registry.
//!
//! Every translatable field is declared once per entity type. A declaration
//! whose languages or default language are unknown (neither given on the
//! field nor available from the process-wide [`LanguageConfig`]) is queued
//! as pending and resolved exactly once, when [`FieldRegistry::finalize_pending`]
//! runs against a complete configuration. Resolved specs are immutable and
//! shared as `Arc<FieldI18nSpec>`.

use crate::catalog::{FieldDef, ScalarType};
use crate::config::{dedup_languages, LanguageConfig};
use crate::error::{ConfigurationError, Error, Result};
use crate::language::normalize_language;
use crate::naming::column_for;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Resolved language configuration of one translatable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldI18nSpec {
    entity: String,
    field: String,
    languages: Vec<String>,
    default_language: String,
}

impl FieldI18nSpec {
    /// Entity type owning the field.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Logical field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Configured languages, default first-class member, in declaration order.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// The language stored in the unsuffixed column.
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Check whether `language` is configured for this field.
    pub fn contains(&self, language: &str) -> bool {
        let language = normalize_language(language);
        self.languages.iter().any(|l| *l == language)
    }

    /// Physical column holding `language`.
    pub fn column_for(&self, language: &str) -> Result<String> {
        let language = normalize_language(language);
        if !self.languages.contains(&language) {
            return Err(Error::ColumnResolution {
                entity: self.entity.clone(),
                field: self.field.clone(),
                language,
            });
        }
        Ok(column_for(&self.field, &language, &self.default_language))
    }

    /// Every `(language, column)` pair, in language order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.languages.iter().map(move |language| {
            (
                language.as_str(),
                column_for(&self.field, language, &self.default_language),
            )
        })
    }

    /// Languages other than the default, in declaration order.
    pub fn non_default_languages(&self) -> impl Iterator<Item = &str> {
        self.languages
            .iter()
            .map(String::as_str)
            .filter(move |l| *l != self.default_language)
    }
}

/// Per-field options given at declaration time.
///
/// Anything left unset falls back to the process-wide [`LanguageConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct I18nOptions {
    /// Languages of this field.
    pub languages: Option<Vec<String>>,
    /// Default language of this field.
    pub default_language: Option<String>,
    /// Column template. Defaults to a nullable string column.
    pub column: Option<FieldDef>,
}

impl I18nOptions {
    /// Create empty options (everything from the process-wide configuration).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the languages of the field.
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages = Some(dedup_languages(languages));
        self
    }

    /// Set the default language of the field.
    pub fn with_default_language(mut self, language: &str) -> Self {
        self.default_language = Some(normalize_language(language));
        self
    }

    /// Set the column template.
    pub fn with_column(mut self, column: FieldDef) -> Self {
        self.column = Some(column);
        self
    }

    fn normalized(mut self) -> Self {
        self.languages = self.languages.map(dedup_languages);
        self.default_language = self.default_language.map(|l| normalize_language(&l));
        self
    }
}

/// Resolution state of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    /// Waiting for a process-wide configuration.
    Pending,
    /// Languages resolved.
    Resolved(Arc<FieldI18nSpec>),
}

impl FieldState {
    /// Check whether the field is still pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, FieldState::Pending)
    }

    /// The resolved spec, if any.
    pub fn spec(&self) -> Option<&Arc<FieldI18nSpec>> {
        match self {
            FieldState::Pending => None,
            FieldState::Resolved(spec) => Some(spec),
        }
    }
}

/// A declared translatable field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    /// Logical field name.
    pub field: String,
    /// Column template, named after the logical field.
    pub template: FieldDef,
    /// Options as declared (normalized).
    pub options: I18nOptions,
    /// Resolution state.
    pub state: FieldState,
}

#[derive(Debug, Default)]
struct RegistryState {
    global: Option<LanguageConfig>,
    entities: BTreeMap<String, Vec<FieldDeclaration>>,
}

/// Registry of translatable fields per entity type.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    state: RwLock<RegistryState>,
}

static GLOBAL: OnceLock<Arc<FieldRegistry>> = OnceLock::new();

impl FieldRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with a process-wide configuration already set.
    pub fn with_config(config: LanguageConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                global: Some(config),
                entities: BTreeMap::new(),
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<FieldRegistry> {
        GLOBAL.get_or_init(|| Arc::new(FieldRegistry::new())).clone()
    }

    /// Declare a translatable field.
    ///
    /// Resolves immediately when languages and default language are known,
    /// otherwise queues the declaration as pending.
    pub fn declare(
        &self,
        entity: &str,
        field: &str,
        options: I18nOptions,
    ) -> std::result::Result<FieldState, ConfigurationError> {
        let options = options.normalized();
        let mut state = self.state.write();

        if let Some(existing) = state
            .entities
            .get(entity)
            .and_then(|decls| decls.iter().find(|d| d.field == field))
        {
            if existing.options == options {
                return Ok(existing.state.clone());
            }
            return Err(ConfigurationError::Conflict {
                entity: entity.to_string(),
                field: field.to_string(),
            });
        }

        let template = options
            .column
            .as_ref()
            .map(|column| column.renamed(field))
            .unwrap_or_else(|| FieldDef::optional(field, ScalarType::String));

        let field_state = match resolve_spec(entity, field, &options, state.global.as_ref())? {
            Some(spec) => {
                debug!(
                    entity = entity,
                    field = field,
                    languages = ?spec.languages,
                    default_language = %spec.default_language,
                    "Resolved translatable field"
                );
                FieldState::Resolved(Arc::new(spec))
            }
            None => {
                debug!(entity = entity, field = field, "Queued translatable field as pending");
                FieldState::Pending
            }
        };

        state.entities.entry(entity.to_string()).or_default().push(FieldDeclaration {
            field: field.to_string(),
            template,
            options,
            state: field_state.clone(),
        });

        Ok(field_state)
    }

    /// Store the process-wide configuration and finalize pending fields.
    pub fn set_global_config(
        &self,
        config: LanguageConfig,
    ) -> std::result::Result<usize, ConfigurationError> {
        let mut state = self.state.write();
        state.global = Some(config);
        finalize_locked(&mut state)
    }

    /// The process-wide configuration, if set.
    pub fn global_config(&self) -> Option<LanguageConfig> {
        self.state.read().global.clone()
    }

    /// Resolve every pending declaration against the process-wide
    /// configuration.
    ///
    /// Returns the number of fields resolved. Fields that cannot be resolved
    /// stay pending and are all listed in the returned error.
    pub fn finalize_pending(&self) -> std::result::Result<usize, ConfigurationError> {
        let mut state = self.state.write();
        finalize_locked(&mut state)
    }

    /// The resolved spec of a field, if it is translatable and resolved.
    pub fn resolve(&self, entity: &str, field: &str) -> Option<Arc<FieldI18nSpec>> {
        let state = self.state.read();
        state
            .entities
            .get(entity)?
            .iter()
            .find(|d| d.field == field)?
            .state
            .spec()
            .cloned()
    }

    /// The resolved spec of a field, failing if it is declared but pending.
    ///
    /// Returns `Ok(None)` for fields that are not translatable.
    pub fn require(
        &self,
        entity: &str,
        field: &str,
    ) -> std::result::Result<Option<Arc<FieldI18nSpec>>, ConfigurationError> {
        let state = self.state.read();
        let Some(declaration) = state
            .entities
            .get(entity)
            .and_then(|decls| decls.iter().find(|d| d.field == field))
        else {
            return Ok(None);
        };

        match &declaration.state {
            FieldState::Resolved(spec) => Ok(Some(spec.clone())),
            FieldState::Pending => Err(ConfigurationError::Unresolved {
                entity: entity.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Every resolved spec of an entity type, in declaration order.
    pub fn specs_for(
        &self,
        entity: &str,
    ) -> std::result::Result<Vec<Arc<FieldI18nSpec>>, ConfigurationError> {
        let state = self.state.read();
        let Some(declarations) = state.entities.get(entity) else {
            return Ok(Vec::new());
        };

        declarations
            .iter()
            .map(|d| match &d.state {
                FieldState::Resolved(spec) => Ok(spec.clone()),
                FieldState::Pending => Err(ConfigurationError::Unresolved {
                    entity: entity.to_string(),
                    field: d.field.clone(),
                }),
            })
            .collect()
    }

    /// Every declaration of an entity type, in declaration order.
    pub fn declarations(&self, entity: &str) -> Vec<FieldDeclaration> {
        self.state
            .read()
            .entities
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Check whether an entity type has any translatable field.
    pub fn has_translatable_fields(&self, entity: &str) -> bool {
        self.state
            .read()
            .entities
            .get(entity)
            .is_some_and(|decls| !decls.is_empty())
    }

    /// Entity types with at least one declared field, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        self.state.read().entities.keys().cloned().collect()
    }

    /// Number of declarations still pending.
    pub fn pending_count(&self) -> usize {
        self.state
            .read()
            .entities
            .values()
            .flatten()
            .filter(|d| d.state.is_pending())
            .count()
    }

    /// Forget every declaration and the process-wide configuration.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.entities.clear();
        state.global = None;
        debug!("Field registry reset");
    }
}

fn finalize_locked(state: &mut RegistryState) -> std::result::Result<usize, ConfigurationError> {
    let global = state.global.clone();
    let mut resolved = 0;
    let mut failures = Vec::new();

    for (entity, declarations) in state.entities.iter_mut() {
        for declaration in declarations.iter_mut().filter(|d| d.state.is_pending()) {
            let outcome = resolve_spec(
                entity,
                &declaration.field,
                &declaration.options,
                global.as_ref(),
            )
            .and_then(|spec| {
                spec.ok_or_else(|| {
                    incomplete(
                        entity,
                        &declaration.field,
                        &declaration.options,
                        global.as_ref(),
                    )
                })
            });

            match outcome {
                Ok(spec) => {
                    declaration.state = FieldState::Resolved(Arc::new(spec));
                    resolved += 1;
                }
                Err(e) => failures.push(e.to_failure()),
            }
        }
    }

    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            resolved = resolved,
            "Failed to finalize translatable fields"
        );
        return Err(ConfigurationError::Finalize { failures });
    }

    if resolved > 0 {
        info!(resolved = resolved, "Finalized pending translatable fields");
    }
    Ok(resolved)
}

/// Resolve a field's languages and default, or `None` if either is unknown.
fn resolve_spec(
    entity: &str,
    field: &str,
    options: &I18nOptions,
    global: Option<&LanguageConfig>,
) -> std::result::Result<Option<FieldI18nSpec>, ConfigurationError> {
    let languages = match (&options.languages, global) {
        (Some(languages), _) => languages.clone(),
        (None, Some(config)) if !config.languages.is_empty() => config.languages.clone(),
        _ => return Ok(None),
    };
    let default_language = match (&options.default_language, global) {
        (Some(default), _) => default.clone(),
        (None, Some(LanguageConfig {
            default_language: Some(default),
            ..
        })) => default.clone(),
        _ => return Ok(None),
    };

    if languages.is_empty() {
        return Err(ConfigurationError::EmptyLanguages {
            entity: entity.to_string(),
            field: field.to_string(),
        });
    }
    if !languages.contains(&default_language) {
        return Err(ConfigurationError::DefaultNotInLanguages {
            entity: entity.to_string(),
            field: field.to_string(),
            default_language,
            languages,
        });
    }

    Ok(Some(FieldI18nSpec {
        entity: entity.to_string(),
        field: field.to_string(),
        languages,
        default_language,
    }))
}

/// Describe why a field could not be resolved.
fn incomplete(
    entity: &str,
    field: &str,
    options: &I18nOptions,
    global: Option<&LanguageConfig>,
) -> ConfigurationError {
    let has_languages = options.languages.is_some()
        || global.is_some_and(|config| !config.languages.is_empty());
    if has_languages {
        ConfigurationError::MissingDefault {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    } else {
        ConfigurationError::EmptyLanguages {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn product_options() -> I18nOptions {
        I18nOptions::new()
            .with_languages(["en", "es", "fr"])
            .with_default_language("en")
    }

    #[test]
    fn test_declare_resolves_immediately() {
        let registry = FieldRegistry::new();
        let state = registry
            .declare("Product", "name", product_options())
            .unwrap();

        let spec = state.spec().unwrap();
        assert_eq!(spec.languages(), ["en", "es", "fr"]);
        assert_eq!(spec.default_language(), "en");
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.resolve("Product", "name").as_deref(), Some(&**spec));
    }

    #[test]
    fn test_declare_normalizes_case() {
        let registry = FieldRegistry::new();
        let options = I18nOptions {
            languages: Some(vec!["EN".into(), "Es".into()]),
            default_language: Some("EN".into()),
            column: None,
        };
        registry.declare("Product", "name", options).unwrap();

        let spec = registry.resolve("Product", "name").unwrap();
        assert_eq!(spec.languages(), ["en", "es"]);
        assert_eq!(spec.column_for("ES").unwrap(), "name_es");
    }

    #[test]
    fn test_column_for_default_and_suffixed() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", product_options())
            .unwrap();
        let spec = registry.resolve("Product", "name").unwrap();

        assert_eq!(spec.column_for("en").unwrap(), "name");
        assert_eq!(spec.column_for("es").unwrap(), "name_es");
        assert_eq!(spec.column_for("fr").unwrap(), "name_fr");

        let columns: Vec<String> = spec.columns().map(|(_, c)| c).collect();
        assert_eq!(columns, vec!["name", "name_es", "name_fr"]);
        assert_eq!(spec.non_default_languages().collect::<Vec<_>>(), vec!["es", "fr"]);
    }

    #[test]
    fn test_column_for_unknown_language() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", product_options())
            .unwrap();
        let spec = registry.resolve("Product", "name").unwrap();

        let err = spec.column_for("de").unwrap_err();
        assert!(matches!(
            err,
            Error::ColumnResolution { ref language, .. } if language == "de"
        ));
    }

    #[test]
    fn test_default_must_be_in_languages() {
        let registry = FieldRegistry::new();
        let err = registry
            .declare(
                "Product",
                "name",
                I18nOptions::new()
                    .with_languages(["es", "fr"])
                    .with_default_language("en"),
            )
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::DefaultNotInLanguages { .. }));
        assert!(registry.resolve("Product", "name").is_none());
    }

    #[test]
    fn test_explicit_empty_languages_rejected() {
        let registry = FieldRegistry::new();
        let err = registry
            .declare(
                "Product",
                "name",
                I18nOptions {
                    languages: Some(Vec::new()),
                    default_language: Some("en".into()),
                    column: None,
                },
            )
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::EmptyLanguages { .. }));
    }

    #[test]
    fn test_pending_until_global_config() {
        let registry = FieldRegistry::new();
        let state = registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();
        assert!(state.is_pending());
        assert_eq!(registry.pending_count(), 1);

        let err = registry.require("Product", "name").unwrap_err();
        assert!(matches!(err, ConfigurationError::Unresolved { .. }));
        assert!(registry.specs_for("Product").is_err());

        let resolved = registry
            .set_global_config(LanguageConfig::new(["en", "es"], "en"))
            .unwrap();
        assert_eq!(resolved, 1);
        assert_eq!(registry.pending_count(), 0);

        let spec = registry.require("Product", "name").unwrap().unwrap();
        assert_eq!(spec.languages(), ["en", "es"]);
    }

    #[test]
    fn test_field_options_override_global() {
        let registry = FieldRegistry::with_config(LanguageConfig::new(["en", "es"], "en"));
        registry
            .declare(
                "Product",
                "name",
                I18nOptions::new().with_languages(["es", "fr"]).with_default_language("es"),
            )
            .unwrap();
        registry
            .declare("Product", "description", I18nOptions::new().with_default_language("es"))
            .unwrap();

        let name = registry.resolve("Product", "name").unwrap();
        assert_eq!(name.languages(), ["es", "fr"]);
        assert_eq!(name.column_for("es").unwrap(), "name");

        let description = registry.resolve("Product", "description").unwrap();
        assert_eq!(description.languages(), ["en", "es"]);
        assert_eq!(description.column_for("en").unwrap(), "description_en");
    }

    #[test]
    fn test_double_finalize_is_noop() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();

        assert_eq!(
            registry
                .set_global_config(LanguageConfig::new(["en", "es"], "en"))
                .unwrap(),
            1
        );
        let before = registry.resolve("Product", "name").unwrap();

        assert_eq!(registry.finalize_pending().unwrap(), 0);
        assert_eq!(registry.finalize_pending().unwrap(), 0);
        let after = registry.resolve("Product", "name").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_finalize_lists_every_offender() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();
        registry
            .declare(
                "Category",
                "title",
                I18nOptions::new().with_default_language("de"),
            )
            .unwrap();
        registry
            .declare(
                "Category",
                "summary",
                I18nOptions::new().with_languages(["en"]),
            )
            .unwrap();

        let err = registry
            .set_global_config(LanguageConfig::default().with_languages(["en", "es"]))
            .unwrap_err();

        let ConfigurationError::Finalize { failures } = err else {
            panic!("expected finalize error");
        };
        let offenders: Vec<String> = failures
            .iter()
            .map(|f| format!("{}.{}", f.entity, f.field))
            .collect();
        assert_eq!(offenders, vec!["Category.title", "Category.summary", "Product.name"]);
        assert_eq!(registry.pending_count(), 3);
    }

    #[test]
    fn test_finalize_without_config_fails() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();

        let err = registry.finalize_pending().unwrap_err();
        let ConfigurationError::Finalize { failures } = err else {
            panic!("expected finalize error");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("no languages"));
    }

    #[test]
    fn test_finalize_with_nothing_pending() {
        let registry = FieldRegistry::new();
        assert_eq!(registry.finalize_pending().unwrap(), 0);
    }

    #[test]
    fn test_redeclare() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", product_options())
            .unwrap();

        let again = registry
            .declare("Product", "name", product_options())
            .unwrap();
        assert!(!again.is_pending());
        assert_eq!(registry.declarations("Product").len(), 1);

        let err = registry
            .declare(
                "Product",
                "name",
                I18nOptions::new().with_languages(["en"]).with_default_language("en"),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Conflict { .. }));
    }

    #[test]
    fn test_template_named_after_field() {
        let registry = FieldRegistry::new();
        registry
            .declare(
                "Product",
                "name",
                product_options().with_column(
                    FieldDef::required("ignored", ScalarType::String).with_max_length(80),
                ),
            )
            .unwrap();
        registry
            .declare("Product", "summary", product_options())
            .unwrap();

        let declarations = registry.declarations("Product");
        assert_eq!(declarations[0].template.name, "name");
        assert_eq!(declarations[0].template.max_length, Some(80));
        assert!(!declarations[0].template.is_nullable());
        assert!(declarations[1].template.is_nullable());
    }

    #[test]
    fn test_require_untranslatable_field() {
        let registry = FieldRegistry::new();
        registry
            .declare("Product", "name", product_options())
            .unwrap();

        assert_eq!(registry.require("Product", "price").unwrap(), None);
        assert_eq!(registry.require("Order", "name").unwrap(), None);
        assert!(registry.specs_for("Order").unwrap().is_empty());
    }

    #[test]
    fn test_entity_types_and_reset() {
        let registry = FieldRegistry::with_config(LanguageConfig::new(["en"], "en"));
        registry
            .declare("Product", "name", I18nOptions::new())
            .unwrap();
        registry
            .declare("Category", "title", I18nOptions::new())
            .unwrap();

        assert_eq!(registry.entity_types(), vec!["Category", "Product"]);
        assert!(registry.has_translatable_fields("Product"));

        registry.reset();
        assert!(registry.entity_types().is_empty());
        assert!(registry.global_config().is_none());
        assert!(!registry.has_translatable_fields("Product"));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = FieldRegistry::global();
        let b = FieldRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
