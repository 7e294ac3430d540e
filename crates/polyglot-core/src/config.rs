//! Process-wide language configuration.

use crate::language::normalize_language;

/// Environment variable listing the default languages (comma separated).
pub const LANGUAGES_ENV: &str = "POLYGLOT_LANGUAGES";

/// Environment variable naming the default language.
pub const DEFAULT_LANGUAGE_ENV: &str = "POLYGLOT_DEFAULT_LANGUAGE";

/// Fallback languages and default language for translatable fields that do
/// not declare their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Languages used by fields that declare none.
    pub languages: Vec<String>,
    /// Default language used by fields that declare none.
    pub default_language: Option<String>,
}

impl LanguageConfig {
    /// Create a configuration from a language list and default language.
    pub fn new<I, S>(languages: I, default_language: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::default()
            .with_languages(languages)
            .with_default_language(default_language)
    }

    /// Set the languages.
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages = dedup_languages(languages);
        self
    }

    /// Set the default language.
    pub fn with_default_language(mut self, language: &str) -> Self {
        self.default_language = Some(normalize_language(language));
        self
    }

    /// Load the configuration from `POLYGLOT_LANGUAGES` and
    /// `POLYGLOT_DEFAULT_LANGUAGE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let languages = lookup(LANGUAGES_ENV)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let default_language = lookup(DEFAULT_LANGUAGE_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| normalize_language(&s));

        Self {
            languages: dedup_languages(languages),
            default_language,
        }
    }

    /// Check whether both languages and a default are present.
    pub fn is_complete(&self) -> bool {
        !self.languages.is_empty() && self.default_language.is_some()
    }
}

/// Normalize a language list, dropping duplicates while keeping order.
pub(crate) fn dedup_languages<I, S>(languages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for language in languages {
        let language = normalize_language(language.as_ref());
        if !out.contains(&language) {
            out.push(language);
        }
    }
    out
}
