//! Physical column naming for translatable fields.

/// Separator between a field name and its language suffix.
pub const COLUMN_DELIMITER: &str = "_";

/// Physical column holding `field` in `language`.
///
/// The default language lives in the bare column; every other language gets
/// a `_<language>` suffix. Every component that needs a physical name goes
/// through this function.
pub fn column_for(field: &str, language: &str, default_language: &str) -> String {
    if language == default_language {
        field.to_string()
    } else {
        let mut column =
            String::with_capacity(field.len() + COLUMN_DELIMITER.len() + language.len());
        column.push_str(field);
        column.push_str(COLUMN_DELIMITER);
        column.push_str(language);
        column
    }
}
