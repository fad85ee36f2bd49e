//! Model diffing.
//!
//! Compares an application's recorded models with its live definitions
//! and produces the operations that turn the former into the latter.

use super::operation::{
    AddFields, AddIndex, CreateModel, DeleteModel, Operation, RemoveFields, RemoveIndex,
};
use crate::catalog::{FieldDef, ModelDef};
use std::collections::BTreeMap;

/// Operations reconciling `recorded` with `live` for `app`.
///
/// Output order is deterministic: deleted models first, then each live
/// model by name. Within a changed model, indexes are removed before
/// fields so no field is dropped while indexed, and added after fields.
pub fn diff_models(
    app: &str,
    recorded: &BTreeMap<String, ModelDef>,
    live: &BTreeMap<String, ModelDef>,
) -> Vec<Operation> {
    let mut ops = Vec::new();

    // Removed models
    for name in recorded.keys().filter(|name| !live.contains_key(*name)) {
        ops.push(DeleteModel::new(name.as_str()).into());
    }

    for (name, model) in live {
        match recorded.get(name) {
            None => create_model(app, model, &mut ops),
            Some(old) => diff_model(old, model, &mut ops),
        }
    }

    ops
}

fn create_model(app: &str, model: &ModelDef, ops: &mut Vec<Operation>) {
    let mut create = CreateModel::new(model.name.as_str(), model.fields.clone());
    if let Some(table) = &model.table {
        if *table != ModelDef::default_table(app, &model.name) {
            create = create.with_table(table.as_str());
        }
    }
    ops.push(create.into());

    for index in &model.indexes {
        ops.push(AddIndex::new(model.name.as_str(), index.name.as_str(), index.fields.clone()).into());
    }
}

fn diff_model(old: &ModelDef, new: &ModelDef, ops: &mut Vec<Operation>) {
    let model = new.name.as_str();

    // Removed or redefined indexes
    for index in &old.indexes {
        if new.get_index(&index.name) != Some(index) {
            ops.push(RemoveIndex::new(model, index.name.as_str()).into());
        }
    }

    // Removed fields, in recorded order
    let removed: Vec<&str> = old
        .field_names()
        .filter(|name| !new.has_field(name))
        .collect();
    if !removed.is_empty() {
        ops.push(RemoveFields::new(model, removed).into());
    }

    // Added fields, in declaration order
    let added: Vec<FieldDef> = new
        .fields
        .iter()
        .filter(|field| !old.has_field(&field.name))
        .cloned()
        .collect();
    if !added.is_empty() {
        ops.push(AddFields::new(model, added).into());
    }

    // Added or redefined indexes
    for index in &new.indexes {
        if old.get_index(&index.name) != Some(index) {
            ops.push(AddIndex::new(model, index.name.as_str(), index.fields.clone()).into());
        }
    }
}
