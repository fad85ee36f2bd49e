//! Per-application migration state.

use super::error::{MigrationError, Result, StateError};
use super::node::{parse_node_number, Dependency, Node};
use crate::catalog::{Application, ModelDef};
use crate::config::MigrationConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Model definitions of one application as of some point in its history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaState {
    app: String,
    models: BTreeMap<String, ModelDef>,
}

impl SchemaState {
    /// Create an empty state for `app`.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            models: BTreeMap::new(),
        }
    }

    /// Application this state belongs to.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// All models keyed by name.
    pub fn models(&self) -> &BTreeMap<String, ModelDef> {
        &self.models
    }

    /// Get a model if present.
    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    /// Get a model, failing if it is missing.
    pub fn model(&self, name: &str) -> std::result::Result<&ModelDef, StateError> {
        self.models
            .get(name)
            .ok_or_else(|| StateError::ModelNotFound {
                model: name.to_string(),
            })
    }

    /// Get a mutable model, failing if it is missing.
    pub fn model_mut(&mut self, name: &str) -> std::result::Result<&mut ModelDef, StateError> {
        self.models
            .get_mut(name)
            .ok_or_else(|| StateError::ModelNotFound {
                model: name.to_string(),
            })
    }

    /// Add a model, defaulting its table name to `app_model`.
    pub fn insert_model(&mut self, mut model: ModelDef) -> std::result::Result<(), StateError> {
        if self.models.contains_key(&model.name) {
            return Err(StateError::DuplicateModel { model: model.name });
        }
        model.resolve_table(&self.app);
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    /// Remove a model, failing if it is missing.
    pub fn remove_model(&mut self, name: &str) -> std::result::Result<ModelDef, StateError> {
        self.models
            .remove(name)
            .ok_or_else(|| StateError::ModelNotFound {
                model: name.to_string(),
            })
    }
}

/// Where a migrate request leads relative to the applied cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Apply up to and including the node at this index.
    Forward(usize),
    /// Reverse the node at this index and everything after it.
    Backward(usize),
    /// Nothing to do.
    Current,
}

/// One application's recorded history.
///
/// `state` always holds the cumulative effect of every processed node;
/// `last_applied` is the highest node number recorded in the ledger.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) app: Application,
    pub(crate) path: PathBuf,
    pub(crate) state: SchemaState,
    pub(crate) migrations: Vec<Node>,
    pub(crate) last_applied: u32,
}

impl AppState {
    /// Create a state with no nodes, storing node files under `path`.
    pub fn new(app: Application, path: impl Into<PathBuf>) -> Self {
        let state = SchemaState::new(app.name.clone());
        Self {
            app,
            path: path.into(),
            state,
            migrations: Vec::new(),
            last_applied: 0,
        }
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.app.name
    }

    /// The live application descriptor.
    pub fn application(&self) -> &Application {
        &self.app
    }

    /// Directory holding this application's node files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded models as of the last processed node.
    pub fn models(&self) -> &BTreeMap<String, ModelDef> {
        self.state.models()
    }

    /// Recorded state as of the last processed node.
    pub fn state(&self) -> &SchemaState {
        &self.state
    }

    /// Nodes in number order.
    pub fn migrations(&self) -> &[Node] {
        &self.migrations
    }

    /// Get a node by its 1-based number.
    pub fn node(&self, number: u32) -> Option<&Node> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.migrations.get(index)
    }

    /// Highest applied node number (0 when nothing is applied).
    pub fn last_applied(&self) -> u32 {
        self.last_applied
    }

    /// A fresh, unpersisted node following the last one.
    ///
    /// The first node is named `initial`; later ones get a timestamped name
    /// and a dependency on their predecessor.
    pub fn next_node(&self, config: &MigrationConfig) -> Node {
        let number = self.migrations.len() as u32 + 1;
        let name = if number == 1 {
            "initial".to_string()
        } else {
            chrono::Utc::now()
                .format(&config.auto_name_format)
                .to_string()
        };
        let mut node = Node::new(self.name(), number, name);
        if let Some(prev) = self.migrations.last() {
            node.dependencies
                .push(Dependency::new(self.name(), prev.id()));
        }
        node
    }

    /// Resolve a migrate request into a target.
    ///
    /// `None` targets the last node. A name targets the node whose number is
    /// its numeric prefix; `0000` means "nothing applied".
    pub fn target(&self, name: Option<&str>) -> Result<MigrationTarget> {
        if self.migrations.is_empty() {
            return Err(MigrationError::NoMigrations {
                app: self.name().to_string(),
            });
        }
        let number = match name {
            None => self.migrations.len() as u32,
            Some(name) => parse_node_number(name).ok_or_else(|| MigrationError::InvalidNodeName {
                app: self.name().to_string(),
                name: name.to_string(),
            })?,
        };
        if number as usize > self.migrations.len() {
            return Err(MigrationError::NodeOutOfRange {
                app: self.name().to_string(),
                number,
            });
        }

        if number < self.last_applied {
            Ok(MigrationTarget::Backward(number as usize))
        } else if number == 0 {
            Ok(MigrationTarget::Current)
        } else {
            Ok(MigrationTarget::Forward(number as usize - 1))
        }
    }

    /// Replay the nodes before `index` onto an empty state.
    pub(crate) fn state_before(&self, index: usize) -> Result<SchemaState> {
        let mut state = SchemaState::new(self.name());
        for node in &self.migrations[..index] {
            node.fold_into(&mut state)?;
        }
        Ok(state)
    }
}
