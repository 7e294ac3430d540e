//! Language codes and the per-handle language context.

/// Canonicalize a language code.
///
/// Codes are compared case-insensitively everywhere, so every code entering
/// the system passes through here first. Whether the code names a real
/// language is not checked.
pub fn normalize_language(code: &str) -> String {
    code.to_lowercase()
}

/// The "current language" of a repository or query builder.
///
/// Unset means every field reads and writes its own default language. The
/// context only changes through [`LanguageContext::set`] and
/// [`LanguageContext::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageContext {
    current: Option<String>,
}

impl LanguageContext {
    /// Create an unset context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context set to `language`.
    pub fn with_language(language: &str) -> Self {
        Self {
            current: Some(normalize_language(language)),
        }
    }

    /// Set the current language.
    pub fn set(&mut self, language: &str) {
        self.current = Some(normalize_language(language));
    }

    /// Clear the current language.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The current language, if set.
    pub fn get(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Check whether a language is set.
    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }
}
