//! Field definitions for models.

use super::types::FieldType;
use serde::{Deserialize, Serialize};

/// A field definition within a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name (unique within the model).
    pub name: String,
    /// Column data type.
    pub field_type: FieldType,
    /// Column name override. `None` means the column is named after the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Whether this field is the model's primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    /// Whether the column carries a unique constraint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    /// Default value if not provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

/// Default value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Current timestamp (evaluated at insert time).
    CurrentTimestamp,
}

impl FieldDef {
    /// Create a new field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            column: None,
            primary_key: false,
            unique: false,
            default: None,
        }
    }

    /// Create an auto-incrementing primary key field.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, FieldType::AutoIncrement)
        }
    }

    /// Set the column name.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Mark as unique.
    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// The column this field is stored in.
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScalarType;

    #[test]
    fn test_column_name_defaults_to_field_name() {
        let field = FieldDef::new("email", FieldType::scalar(ScalarType::string()));
        assert_eq!(field.column_name(), "email");

        let field = field.with_column("email_address");
        assert_eq!(field.column_name(), "email_address");
    }

    #[test]
    fn test_serialization_skips_unset_flags() {
        let field = FieldDef::new("age", FieldType::scalar(ScalarType::Int32));
        let json = serde_json::to_value(&field).unwrap();

        let object = json.as_object().unwrap();
        assert!(object.contains_key("name"));
        assert!(object.contains_key("field_type"));
        assert!(!object.contains_key("primary_key"));
        assert!(!object.contains_key("default"));

        let restored: FieldDef = serde_json::from_value(json).unwrap();
        assert_eq!(restored, field);
    }

    #[test]
    fn test_primary_key_builder() {
        let id = FieldDef::primary_key("id");
        assert!(id.primary_key);
        assert_eq!(id.field_type, FieldType::AutoIncrement);
    }
}
