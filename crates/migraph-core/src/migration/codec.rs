//! Node file records and the operation name registry.
//!
//! Operations are stored as single-key objects, `{"AddFields": {...}}`.
//! The key selects a decoder from the [`OperationRegistry`]; built-in
//! operations are registered up front and external ones can be added.

use super::error::{MigrationError, NodeIoError, Result};
use super::node::Dependency;
use super::operation::{
    AddFields, AddIndex, CreateModel, DeleteModel, Operation, RemoveFields, RemoveIndex,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// On-disk shape of a node file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    pub app: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub operations: Vec<Value>,
}

/// Turns an operation payload into an [`Operation`].
pub type OperationDecoder = fn(Value) -> std::result::Result<Operation, NodeIoError>;

fn decode_builtin<T>(payload: Value) -> std::result::Result<Operation, NodeIoError>
where
    T: DeserializeOwned + Into<Operation>,
{
    Ok(serde_json::from_value::<T>(payload)?.into())
}

/// Operation names known to the node file reader and writer.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    decoders: HashMap<String, OperationDecoder>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    /// Registry with every built-in operation.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, OperationDecoder); 6] = [
            ("CreateModel", decode_builtin::<CreateModel>),
            ("DeleteModel", decode_builtin::<DeleteModel>),
            ("AddFields", decode_builtin::<AddFields>),
            ("RemoveFields", decode_builtin::<RemoveFields>),
            ("AddIndex", decode_builtin::<AddIndex>),
            ("RemoveIndex", decode_builtin::<RemoveIndex>),
        ];
        for (name, decoder) in builtins {
            registry.decoders.insert(name.to_string(), decoder);
        }
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder under `name`.
    ///
    /// Fails if the name is taken, including by a built-in.
    pub fn register(&mut self, name: impl Into<String>, decoder: OperationDecoder) -> Result<()> {
        let name = name.into();
        if self.decoders.contains_key(&name) {
            return Err(MigrationError::DuplicateOperation(name));
        }
        self.decoders.insert(name, decoder);
        Ok(())
    }

    /// Whether `name` has a decoder.
    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Encode an operation as its single-key record.
    pub fn encode(&self, op: &Operation) -> std::result::Result<Value, NodeIoError> {
        let name = op.op_name();
        if !self.contains(name) {
            return Err(NodeIoError::UnknownOperation(name.to_string()));
        }
        let mut record = Map::with_capacity(1);
        record.insert(name.to_string(), op.payload()?);
        Ok(Value::Object(record))
    }

    /// Decode a single-key record.
    pub fn decode(&self, record: Value) -> std::result::Result<Operation, NodeIoError> {
        let Value::Object(map) = record else {
            return Err(NodeIoError::Format(
                "operation record must be an object".to_string(),
            ));
        };
        if map.len() != 1 {
            return Err(NodeIoError::Format(format!(
                "operation record must have exactly one key, found {}",
                map.len()
            )));
        }
        let Some((name, payload)) = map.into_iter().next() else {
            return Err(NodeIoError::Format("empty operation record".to_string()));
        };
        let decoder = self
            .decoders
            .get(&name)
            .ok_or(NodeIoError::UnknownOperation(name))?;
        decoder(payload)
    }
}
