//! Column type definitions for model fields.

use serde::{Deserialize, Serialize};

/// Scalar column types a model field can map to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Number of digits after decimal point.
        scale: u8,
    },
    /// UTF-8 string with an optional maximum length.
    String {
        /// Maximum length in characters, if bounded.
        max_length: Option<u32>,
    },
    /// Binary data.
    Bytes,
    /// Timestamp.
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

/// Field types as seen by the migration engine.
///
/// The engine never interprets these beyond passing them to a schema engine;
/// the variants only need to be rich enough to round-trip through node files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A non-null scalar column.
    Scalar(ScalarType),
    /// A nullable scalar column.
    OptionalScalar(ScalarType),
    /// Auto-incrementing integer primary key.
    AutoIncrement,
    /// Reference to another model's primary key.
    ForeignKey {
        /// Referenced model, as `app.Model` or a bare model name in the same app.
        model: String,
        /// Whether the reference may be null.
        nullable: bool,
    },
}

impl ScalarType {
    /// Unbounded string type.
    pub fn string() -> Self {
        ScalarType::String { max_length: None }
    }

    /// String type limited to `max_length` characters.
    pub fn varchar(max_length: u32) -> Self {
        ScalarType::String {
            max_length: Some(max_length),
        }
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float64 | ScalarType::Decimal { .. }
        )
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an optional scalar field type.
    pub fn optional_scalar(scalar: ScalarType) -> Self {
        FieldType::OptionalScalar(scalar)
    }

    /// Create a non-null foreign key to `model`.
    pub fn foreign_key(model: impl Into<String>) -> Self {
        FieldType::ForeignKey {
            model: model.into(),
            nullable: false,
        }
    }

    /// Check if this type is nullable.
    pub fn is_nullable(&self) -> bool {
        match self {
            FieldType::OptionalScalar(_) => true,
            FieldType::ForeignKey { nullable, .. } => *nullable,
            FieldType::Scalar(_) | FieldType::AutoIncrement => false,
        }
    }

    /// Get the inner scalar type if this is a scalar-based type.
    pub fn scalar_type(&self) -> Option<&ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => Some(s),
            _ => None,
        }
    }
}
