//! Engine-side view of a table.

use crate::catalog::{FieldDef, ModelDef};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A physical table as tracked by the bundled engines.
///
/// Columns and indexes are keyed by name, so two tables compare equal
/// regardless of the order in which columns were added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Column definitions keyed by column name.
    pub columns: BTreeMap<String, FieldDef>,
    /// Index column lists keyed by index name.
    pub indexes: BTreeMap<String, Vec<String>>,
}

impl Table {
    /// Build the table for a model. Indexes are created separately.
    pub fn from_model(model: &ModelDef) -> Self {
        let columns = model
            .fields
            .iter()
            .map(|f| (f.column_name().to_string(), f.clone()))
            .collect();
        Self {
            name: model.table_name().to_string(),
            columns,
            indexes: BTreeMap::new(),
        }
    }

    /// Add columns, failing if any already exists.
    pub fn add_columns(&mut self, fields: &[FieldDef]) -> Result<(), EngineError> {
        for field in fields {
            if self.columns.contains_key(field.column_name()) {
                return Err(EngineError::ColumnExists {
                    table: self.name.clone(),
                    column: field.column_name().to_string(),
                });
            }
        }
        for field in fields {
            self.columns
                .insert(field.column_name().to_string(), field.clone());
        }
        Ok(())
    }

    /// Drop columns, failing if any is missing.
    pub fn drop_columns(&mut self, columns: &[String]) -> Result<(), EngineError> {
        if let Some(missing) = columns.iter().find(|c| !self.columns.contains_key(*c)) {
            return Err(EngineError::ColumnNotFound {
                table: self.name.clone(),
                column: missing.clone(),
            });
        }
        for column in columns {
            self.columns.remove(column);
        }
        Ok(())
    }

    /// Create an index over existing columns.
    pub fn add_index(&mut self, name: &str, columns: Vec<String>) -> Result<(), EngineError> {
        if self.indexes.contains_key(name) {
            return Err(EngineError::IndexExists {
                table: self.name.clone(),
                index: name.to_string(),
            });
        }
        if let Some(missing) = columns.iter().find(|c| !self.columns.contains_key(*c)) {
            return Err(EngineError::ColumnNotFound {
                table: self.name.clone(),
                column: missing.clone(),
            });
        }
        self.indexes.insert(name.to_string(), columns);
        Ok(())
    }

    /// Drop an index.
    pub fn drop_index(&mut self, name: &str) -> Result<(), EngineError> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::IndexNotFound {
                table: self.name.clone(),
                index: name.to_string(),
            })
    }
}

/// Map model field names to their column names.
pub(crate) fn column_names(model: &ModelDef, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .map(|name| match model.get_field(name) {
            Some(field) => field.column_name().to_string(),
            None => name.clone(),
        })
        .collect()
}
