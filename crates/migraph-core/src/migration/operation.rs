//! Schema change operations.
//!
//! Each operation knows how to change an in-memory [`SchemaState`] and how
//! to apply or reverse itself on a [`SchemaEngine`]. `run` and `backwards`
//! receive the state after the operation (`state`) and before it (`prev`).

use super::error::{OperationError, StateError};
use super::state::SchemaState;
use crate::catalog::{FieldDef, IndexDef, ModelDef};
use crate::engine::SchemaEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// An operation kind defined outside this crate.
///
/// Register a decoder for it in an
/// [`OperationRegistry`](super::OperationRegistry) so node files containing
/// it can be loaded.
pub trait CustomOperation: fmt::Debug + Send + Sync {
    /// Name used as the record key in node files.
    fn op_name(&self) -> &str;

    /// Apply this change to the model state.
    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError>;

    /// Apply this change to the database.
    fn run(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError>;

    /// Reverse this change on the database.
    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError>;

    /// Record payload written under [`op_name`](Self::op_name).
    fn payload(&self) -> serde_json::Value;
}

/// Create a model and its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModel {
    /// Model name.
    pub model: String,
    /// Table name when it differs from the `app_model` default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

/// Delete a model and drop its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteModel {
    /// Model name.
    pub model: String,
}

/// Add fields to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFields {
    /// Model name.
    pub model: String,
    /// Field definitions to add.
    pub fields: Vec<FieldDef>,
}

/// Remove fields from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveFields {
    /// Model name.
    pub model: String,
    /// Names of the fields to remove.
    pub fields: Vec<String>,
}

/// Add a named index to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddIndex {
    /// Model name.
    pub model: String,
    /// Index name.
    pub name: String,
    /// Indexed fields, in order.
    pub fields: Vec<String>,
}

/// Remove a named index from a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveIndex {
    /// Model name.
    pub model: String,
    /// Index name.
    pub name: String,
}

/// A schema change.
#[derive(Debug, Clone)]
pub enum Operation {
    /// See [`CreateModel`].
    CreateModel(CreateModel),
    /// See [`DeleteModel`].
    DeleteModel(DeleteModel),
    /// See [`AddFields`].
    AddFields(AddFields),
    /// See [`RemoveFields`].
    RemoveFields(RemoveFields),
    /// See [`AddIndex`].
    AddIndex(AddIndex),
    /// See [`RemoveIndex`].
    RemoveIndex(RemoveIndex),
    /// An externally defined operation.
    Custom(Arc<dyn CustomOperation>),
}

impl Operation {
    /// Name used as the record key in node files.
    pub fn op_name(&self) -> &str {
        match self {
            Operation::CreateModel(_) => "CreateModel",
            Operation::DeleteModel(_) => "DeleteModel",
            Operation::AddFields(_) => "AddFields",
            Operation::RemoveFields(_) => "RemoveFields",
            Operation::AddIndex(_) => "AddIndex",
            Operation::RemoveIndex(_) => "RemoveIndex",
            Operation::Custom(op) => op.op_name(),
        }
    }

    /// Apply this change to the model state.
    pub fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        match self {
            Operation::CreateModel(op) => op.set_state(state),
            Operation::DeleteModel(op) => op.set_state(state),
            Operation::AddFields(op) => op.set_state(state),
            Operation::RemoveFields(op) => op.set_state(state),
            Operation::AddIndex(op) => op.set_state(state),
            Operation::RemoveIndex(op) => op.set_state(state),
            Operation::Custom(op) => op.set_state(state),
        }
    }

    /// Apply this change to the database.
    pub fn run(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        match self {
            Operation::CreateModel(op) => op.run(engine, state),
            Operation::DeleteModel(op) => op.run(engine, prev),
            Operation::AddFields(op) => op.run(engine, state),
            Operation::RemoveFields(op) => op.run(engine, state, prev),
            Operation::AddIndex(op) => op.run(engine, state),
            Operation::RemoveIndex(op) => op.run(engine, prev),
            Operation::Custom(op) => op.run(engine, state, prev),
        }
    }

    /// Reverse this change on the database.
    pub fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        match self {
            Operation::CreateModel(op) => op.backwards(engine, state),
            Operation::DeleteModel(op) => op.backwards(engine, prev),
            Operation::AddFields(op) => op.backwards(engine, state, prev),
            Operation::RemoveFields(op) => op.backwards(engine, prev),
            Operation::AddIndex(op) => op.backwards(engine, state),
            Operation::RemoveIndex(op) => op.backwards(engine, prev),
            Operation::Custom(op) => op.backwards(engine, state, prev),
        }
    }

    /// Record payload written under [`op_name`](Self::op_name).
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Operation::CreateModel(op) => serde_json::to_value(op),
            Operation::DeleteModel(op) => serde_json::to_value(op),
            Operation::AddFields(op) => serde_json::to_value(op),
            Operation::RemoveFields(op) => serde_json::to_value(op),
            Operation::AddIndex(op) => serde_json::to_value(op),
            Operation::RemoveIndex(op) => serde_json::to_value(op),
            Operation::Custom(op) => Ok(op.payload()),
        }
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operation::CreateModel(a), Operation::CreateModel(b)) => a == b,
            (Operation::DeleteModel(a), Operation::DeleteModel(b)) => a == b,
            (Operation::AddFields(a), Operation::AddFields(b)) => a == b,
            (Operation::RemoveFields(a), Operation::RemoveFields(b)) => a == b,
            (Operation::AddIndex(a), Operation::AddIndex(b)) => a == b,
            (Operation::RemoveIndex(a), Operation::RemoveIndex(b)) => a == b,
            (Operation::Custom(a), Operation::Custom(b)) => {
                a.op_name() == b.op_name() && a.payload() == b.payload()
            }
            _ => false,
        }
    }
}

macro_rules! impl_from_operation {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Operation::$variant(op)
                }
            }
        )*
    };
}

impl_from_operation!(
    CreateModel,
    DeleteModel,
    AddFields,
    RemoveFields,
    AddIndex,
    RemoveIndex
);

fn check_unique_names<'a>(
    model: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), StateError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(StateError::DuplicateField {
                model: model.to_string(),
                field: name.to_string(),
            });
        }
    }
    Ok(())
}

impl CreateModel {
    /// Create a model with the default table name.
    pub fn new(model: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            model: model.into(),
            table: None,
            fields,
        }
    }

    /// Set an explicit table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        check_unique_names(&self.model, self.fields.iter().map(|f| f.name.as_str()))?;
        let mut model = ModelDef::new(&self.model).with_fields(self.fields.iter().cloned());
        model.table = self.table.clone();
        state.insert_model(model)
    }

    fn run(&self, engine: &mut dyn SchemaEngine, state: &SchemaState) -> Result<(), OperationError> {
        engine.create_table(state.model(&self.model)?)?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
    ) -> Result<(), OperationError> {
        engine.drop_table(state.model(&self.model)?)?;
        Ok(())
    }
}

impl DeleteModel {
    /// Delete `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        state.remove_model(&self.model).map(|_| ())
    }

    fn run(&self, engine: &mut dyn SchemaEngine, prev: &SchemaState) -> Result<(), OperationError> {
        engine.drop_table(prev.model(&self.model)?)?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        let model = prev.model(&self.model)?;
        engine.create_table(model)?;
        for index in &model.indexes {
            engine.add_index(model, &index.name, &index.fields)?;
        }
        Ok(())
    }
}

impl AddFields {
    /// Add `fields` to `model`.
    pub fn new(model: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            model: model.into(),
            fields,
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        check_unique_names(&self.model, self.fields.iter().map(|f| f.name.as_str()))?;
        let model = state.model_mut(&self.model)?;
        if let Some(dup) = self.fields.iter().find(|f| model.has_field(&f.name)) {
            return Err(StateError::DuplicateField {
                model: self.model.clone(),
                field: dup.name.clone(),
            });
        }
        model.fields.extend(self.fields.iter().cloned());
        Ok(())
    }

    fn run(&self, engine: &mut dyn SchemaEngine, state: &SchemaState) -> Result<(), OperationError> {
        engine.add_columns(state.model(&self.model)?, &self.fields)?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        engine.drop_columns(
            state.model(&self.model)?,
            prev.model(&self.model)?,
            &self.field_names(),
        )?;
        Ok(())
    }
}

impl RemoveFields {
    /// Remove the named fields from `model`.
    pub fn new<I, S>(model: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model: model.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        let model = state.model_mut(&self.model)?;
        for field in &self.fields {
            if !model.has_field(field) {
                return Err(StateError::FieldNotFound {
                    model: self.model.clone(),
                    field: field.clone(),
                });
            }
            if let Some(index) = model.indexes.iter().find(|i| i.fields.contains(field)) {
                return Err(StateError::FieldIndexed {
                    model: self.model.clone(),
                    field: field.clone(),
                    index: index.name.clone(),
                });
            }
        }
        model.fields.retain(|f| !self.fields.contains(&f.name));
        Ok(())
    }

    fn run(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        engine.drop_columns(
            prev.model(&self.model)?,
            state.model(&self.model)?,
            &self.fields,
        )?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        let model = prev.model(&self.model)?;
        let fields = self
            .fields
            .iter()
            .map(|name| {
                model
                    .get_field(name)
                    .cloned()
                    .ok_or_else(|| StateError::FieldNotFound {
                        model: self.model.clone(),
                        field: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        engine.add_columns(model, &fields)?;
        Ok(())
    }
}

impl AddIndex {
    /// Add index `name` over `fields` to `model`.
    pub fn new(model: impl Into<String>, name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
            fields,
        }
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        let model = state.model_mut(&self.model)?;
        if model.get_index(&self.name).is_some() {
            return Err(StateError::DuplicateIndex {
                model: self.model.clone(),
                index: self.name.clone(),
            });
        }
        if let Some(missing) = self.fields.iter().find(|f| !model.has_field(f)) {
            return Err(StateError::FieldNotFound {
                model: self.model.clone(),
                field: missing.clone(),
            });
        }
        model
            .indexes
            .push(IndexDef::new(&self.name, self.fields.iter().cloned()));
        Ok(())
    }

    fn run(&self, engine: &mut dyn SchemaEngine, state: &SchemaState) -> Result<(), OperationError> {
        engine.add_index(state.model(&self.model)?, &self.name, &self.fields)?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        state: &SchemaState,
    ) -> Result<(), OperationError> {
        engine.drop_index(state.model(&self.model)?, &self.name, &self.fields)?;
        Ok(())
    }
}

impl RemoveIndex {
    /// Remove index `name` from `model`.
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
        }
    }

    fn set_state(&self, state: &mut SchemaState) -> Result<(), StateError> {
        let model = state.model_mut(&self.model)?;
        let before = model.indexes.len();
        model.indexes.retain(|i| i.name != self.name);
        if model.indexes.len() == before {
            return Err(StateError::IndexNotFound {
                model: self.model.clone(),
                index: self.name.clone(),
            });
        }
        Ok(())
    }

    fn previous_index<'a>(
        &self,
        prev: &'a SchemaState,
    ) -> Result<(&'a ModelDef, &'a IndexDef), StateError> {
        let model = prev.model(&self.model)?;
        let index = model
            .get_index(&self.name)
            .ok_or_else(|| StateError::IndexNotFound {
                model: self.model.clone(),
                index: self.name.clone(),
            })?;
        Ok((model, index))
    }

    fn run(&self, engine: &mut dyn SchemaEngine, prev: &SchemaState) -> Result<(), OperationError> {
        let (model, index) = self.previous_index(prev)?;
        engine.drop_index(model, &self.name, &index.fields)?;
        Ok(())
    }

    fn backwards(
        &self,
        engine: &mut dyn SchemaEngine,
        prev: &SchemaState,
    ) -> Result<(), OperationError> {
        let (model, index) = self.previous_index(prev)?;
        engine.add_index(model, &self.name, &index.fields)?;
        Ok(())
    }
}
