//! Column definitions within an entity.

use super::types::{FieldType, ScalarType};
use polyglot_proto::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// A physical column definition.
///
/// For translatable fields this doubles as the column template: the
/// default-language column uses it as-is and every other language column is
/// a renamed, nullable clone.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Column data type (carries nullability).
    pub field_type: FieldType,
    /// Maximum length for string-like columns.
    pub max_length: Option<u32>,
    /// Value written on insert when the column is not provided.
    pub default: Option<Value>,
    /// Whether this column should be indexed.
    pub indexed: bool,
}

impl FieldDef {
    /// Create a non-null column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            max_length: None,
            default: None,
            indexed: false,
        }
    }

    /// Create a nullable scalar column.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::OptionalScalar(scalar))
    }

    /// Create a non-null scalar column.
    pub fn required(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(scalar))
    }

    /// Set the maximum length.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set the insert default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as indexed.
    pub fn with_index(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Clone this definition under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Clone this definition as a nullable column, keeping everything else.
    pub fn as_nullable(&self) -> Self {
        Self {
            field_type: self.field_type.into_nullable(),
            ..self.clone()
        }
    }

    /// Check whether the column accepts null.
    pub fn is_nullable(&self) -> bool {
        self.field_type.is_nullable()
    }
}
