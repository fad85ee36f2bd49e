//! The history registry: every application's nodes for one call.

use super::codec::OperationRegistry;
use super::diff::diff_models;
use super::error::{MigrationError, NodeIoError, Result};
use super::node::{parse_node_id, split_node_prefix, Node, NODE_FILE_EXTENSION};
use super::state::AppState;
use crate::catalog::ModelRegistry;
use crate::config::MigrationConfig;
use crate::engine::SchemaEngine;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Position of a node: application index, then node index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    /// Index into [`History::apps`].
    pub app: usize,
    /// Index into the application's nodes (node number minus one).
    pub node: usize,
}

/// Applied status of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    /// Application name.
    pub app: String,
    /// Node identifier, `NNNN_name`.
    pub node: String,
    /// Whether the database has it applied.
    pub applied: bool,
    /// Whether it has been written to disk.
    pub persisted: bool,
}

/// All application states of one make/run call.
///
/// Built by [`History::load`], mutated while diffing, resolving and
/// executing, and dropped (or [`clear`](History::clear)ed) when the call
/// ends.
#[derive(Debug, Default)]
pub struct History {
    pub(crate) apps: Vec<AppState>,
    index: HashMap<String, usize>,
    pub(crate) dependents: HashMap<NodeKey, Vec<NodeKey>>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every registered application's node files and resolve them.
    pub fn load(
        registry: &dyn ModelRegistry,
        config: &MigrationConfig,
        codec: &OperationRegistry,
    ) -> Result<Self> {
        let mut history = Self::new();
        for app in registry.applications() {
            let dir = app
                .path
                .clone()
                .unwrap_or_else(|| config.app_dir(&app.name));
            let nodes = load_nodes(&app.name, &dir, codec)?;
            debug!(app = %app.name, nodes = nodes.len(), dir = %dir.display(), "loaded history");
            let mut state = AppState::new(app, dir);
            state.migrations = nodes;
            history.insert(state);
        }
        history.resolve_all()?;
        Ok(history)
    }

    /// Add an application state, replacing one with the same name.
    pub fn insert(&mut self, state: AppState) -> usize {
        match self.index.get(state.name()) {
            Some(&position) => {
                self.apps[position] = state;
                self.dependents.retain(|key, _| key.app != position);
                for dependents in self.dependents.values_mut() {
                    dependents.retain(|key| key.app != position);
                }
                position
            }
            None => {
                let position = self.apps.len();
                self.index.insert(state.name().to_string(), position);
                self.apps.push(state);
                position
            }
        }
    }

    /// All application states, in registry order.
    pub fn apps(&self) -> &[AppState] {
        &self.apps
    }

    /// Look up an application state.
    pub fn app(&self, name: &str) -> Option<&AppState> {
        self.index.get(name).map(|&i| &self.apps[i])
    }

    /// Look up an application state mutably.
    pub fn app_mut(&mut self, name: &str) -> Option<&mut AppState> {
        self.index.get(name).map(|&i| &mut self.apps[i])
    }

    /// Index of an application, failing if it is not registered.
    pub fn position(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| MigrationError::AppNotFound {
                app: name.to_string(),
            })
    }

    /// The node at `key`.
    pub fn node(&self, key: NodeKey) -> &Node {
        &self.apps[key.app].migrations[key.node]
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        &mut self.apps[key.app].migrations[key.node]
    }

    /// Nodes that declared a dependency on `key`, in resolution order.
    pub fn dependents(&self, key: NodeKey) -> &[NodeKey] {
        self.dependents.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Diff `app`'s recorded state against its live models and append a
    /// node holding the difference.
    ///
    /// Returns `None` when the models are already in sync.
    pub fn make_migrations(&mut self, app: &str, config: &MigrationConfig) -> Result<Option<NodeKey>> {
        let position = self.position(app)?;
        let state = &self.apps[position];
        let operations = diff_models(state.name(), state.models(), &state.application().models);
        if operations.is_empty() {
            debug!(app, "no changes detected");
            return Ok(None);
        }
        let mut node = state.next_node(config);
        node.operations = operations;
        self.push_node(position, node).map(Some)
    }

    /// Append a node with no operations, for hand-written migrations.
    pub fn add_empty_node(&mut self, app: &str, config: &MigrationConfig) -> Result<NodeKey> {
        let position = self.position(app)?;
        let node = self.apps[position].next_node(config);
        self.push_node(position, node)
    }

    fn push_node(&mut self, position: usize, node: Node) -> Result<NodeKey> {
        let saved = self.apps[position].state.clone();
        let key = NodeKey {
            app: position,
            node: self.apps[position].migrations.len(),
        };
        self.apps[position].migrations.push(node);
        if let Err(err) = self.resolve(key) {
            let app = &mut self.apps[position];
            app.migrations.pop();
            app.state = saved;
            return Err(err);
        }
        Ok(key)
    }

    /// Write every unpersisted node of `app` into its directory.
    pub fn save_pending(
        &mut self,
        app: &str,
        codec: &OperationRegistry,
        config: &MigrationConfig,
    ) -> Result<Vec<PathBuf>> {
        let position = self.position(app)?;
        let state = &mut self.apps[position];
        let mut written = Vec::new();
        for node in state.migrations.iter_mut().filter(|n| !n.is_persisted()) {
            written.push(node.save(&state.path, codec, config.pretty)?);
        }
        Ok(written)
    }

    /// Mark nodes applied according to `engine`'s ledger.
    pub fn load_ledger(&mut self, engine: &mut dyn SchemaEngine) -> Result<()> {
        let database = engine.name().to_string();
        engine
            .prepare_ledger()
            .map_err(|e| MigrationError::database(&database, e))?;
        let rows = engine
            .ledger()
            .map_err(|e| MigrationError::database(&database, e))?;

        for app in &mut self.apps {
            app.last_applied = 0;
            for node in &mut app.migrations {
                node.applied = false;
            }
        }

        for row in rows {
            let Some(&position) = self.index.get(&row.app) else {
                warn!(database = %database, app = %row.app, number = row.number, "ledger row for unknown app");
                continue;
            };
            let app = &mut self.apps[position];
            let node = (row.number as usize)
                .checked_sub(1)
                .and_then(|i| app.migrations.get_mut(i))
                .ok_or_else(|| MigrationError::NodeOutOfRange {
                    app: row.app.clone(),
                    number: row.number,
                })?;
            if node.name != row.name {
                warn!(
                    database = %database,
                    node = %node.label(),
                    recorded = %row.name,
                    "ledger name differs from migration file"
                );
            }
            node.applied = true;
            app.last_applied = app.last_applied.max(row.number);
        }
        Ok(())
    }

    /// Status of every node, application by application.
    pub fn status(&self) -> Vec<NodeStatus> {
        self.apps
            .iter()
            .flat_map(|app| app.migrations.iter())
            .map(|node| NodeStatus {
                app: node.app.clone(),
                node: node.id(),
                applied: node.applied,
                persisted: node.is_persisted(),
            })
            .collect()
    }

    /// Take one application's state out of the history.
    pub fn into_app(mut self, name: &str) -> Result<AppState> {
        let position = self.position(name)?;
        Ok(self.apps.swap_remove(position))
    }

    /// Drop every application state.
    pub fn clear(&mut self) {
        self.apps.clear();
        self.index.clear();
        self.dependents.clear();
    }
}

/// Read `dir`'s node files in number order. A missing directory has none.
fn load_nodes(app: &str, dir: &Path, codec: &OperationRegistry) -> Result<Vec<Node>> {
    let directory_error = |source: io::Error| MigrationError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(directory_error(err)),
    };

    let mut nodes = Vec::new();
    for entry in entries {
        let path = entry.map_err(directory_error)?.path();
        if !path.is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(NODE_FILE_EXTENSION)
        {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match parse_node_id(stem) {
            Some((0, _)) => {
                return Err(MigrationError::Load {
                    node: format!("{}.{}", app, stem),
                    source: NodeIoError::Format("migration numbers start at 0001".to_string()),
                })
            }
            Some(_) => nodes.push(Node::load(app, &path, codec)?),
            None if split_node_prefix(stem).is_some() => {
                return Err(MigrationError::Load {
                    node: format!("{}.{}", app, stem),
                    source: NodeIoError::Format(
                        "migration name must be ASCII letters, digits and underscores"
                            .to_string(),
                    ),
                })
            }
            None => debug!(app, file = %path.display(), "ignoring file"),
        }
    }

    nodes.sort_by_key(|n| n.number);
    for (i, node) in nodes.iter().enumerate() {
        let expected = i as u32 + 1;
        if node.number < expected {
            return Err(MigrationError::DuplicateNode {
                app: app.to_string(),
                number: node.number,
            });
        }
        if node.number > expected {
            return Err(MigrationError::MissingNode {
                app: app.to_string(),
                number: expected,
            });
        }
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Application, FieldDef, FieldType, ModelDef, Registry, ScalarType};
    use crate::engine::{LedgerEntry, MemoryEngine};
    use crate::migration::operation::CreateModel;
    use tempfile::TempDir;

    fn registry(dir: &Path) -> Registry {
        Registry::new().with_app(
            Application::new("users").with_path(dir.join("users")).with_model(
                ModelDef::new("User")
                    .with_field(FieldDef::primary_key("id"))
                    .with_field(FieldDef::new("email", FieldType::scalar(ScalarType::string()))),
            ),
        )
    }

    fn write_node(dir: &Path, node: Node) {
        let mut node = node;
        node.save(dir, &OperationRegistry::new(), true).unwrap();
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let history = History::load(
            &registry(tmp.path()),
            &MigrationConfig::default(),
            &OperationRegistry::new(),
        )
        .unwrap();
        assert!(history.app("users").unwrap().migrations().is_empty());
        assert!(matches!(
            history.position("orders"),
            Err(MigrationError::AppNotFound { .. })
        ));
    }

    #[test]
    fn test_make_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(tmp.path());
        let config = MigrationConfig::default();
        let codec = OperationRegistry::new();

        let mut history = History::load(&registry, &config, &codec).unwrap();
        let key = history.make_migrations("users", &config).unwrap().unwrap();
        assert_eq!(history.node(key).id(), "0001_initial");
        assert!(history.node(key).is_processed());
        assert!(history.make_migrations("users", &config).unwrap().is_none());

        let written = history.save_pending("users", &codec, &config).unwrap();
        assert_eq!(written, vec![tmp.path().join("users/0001_initial.json")]);
        assert!(history.save_pending("users", &codec, &config).unwrap().is_empty());

        let reloaded = History::load(&registry, &config, &codec).unwrap();
        let app = reloaded.app("users").unwrap();
        assert_eq!(app.migrations().len(), 1);
        assert_eq!(app.models(), history.app("users").unwrap().models());
        assert!(app.migrations()[0].is_processed());
    }

    #[test]
    fn test_load_rejects_gaps_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("users");
        write_node(&dir, Node::new("users", 1, "initial"));
        write_node(&dir, Node::new("users", 3, "third"));
        let err = History::load(
            &registry(tmp.path()),
            &MigrationConfig::default(),
            &OperationRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::MissingNode { number: 2, .. }));

        write_node(&dir, Node::new("users", 1, "again"));
        let err = History::load(
            &registry(tmp.path()),
            &MigrationConfig::default(),
            &OperationRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateNode { number: 1, .. }));
    }

    #[test]
    fn test_load_rejects_numbered_file_with_bad_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("users");
        write_node(&dir, Node::new("users", 1, "initial"));
        fs::write(
            dir.join("0002_auto_2024-01-01.json"),
            r#"{"app": "users", "dependencies": [], "operations": []}"#,
        )
        .unwrap();

        let err = History::load(
            &registry(tmp.path()),
            &MigrationConfig::default(),
            &OperationRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Load {
                ref node,
                source: NodeIoError::Format(_),
            } if node == "users.0002_auto_2024-01-01"
        ));
    }

    #[test]
    fn test_load_ignores_unrelated_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("users");
        write_node(&dir, Node::new("users", 1, "initial"));
        fs::write(dir.join("README.md"), "notes").unwrap();
        fs::write(dir.join("draft.json"), "{}").unwrap();

        let history = History::load(
            &registry(tmp.path()),
            &MigrationConfig::default(),
            &OperationRegistry::new(),
        )
        .unwrap();
        assert_eq!(history.app("users").unwrap().migrations().len(), 1);
    }

    #[test]
    fn test_load_ledger() {
        let mut history = History::new();
        let mut app = AppState::new(Application::new("users"), "unused");
        app.migrations.push(
            Node::new("users", 1, "initial")
                .with_operation(CreateModel::new("User", vec![FieldDef::primary_key("id")])),
        );
        app.migrations.push(Node::new("users", 2, "second"));
        history.insert(app);
        history.resolve_all().unwrap();

        let mut engine = MemoryEngine::new("default");
        engine.prepare_ledger().unwrap();
        engine
            .record_applied(&LedgerEntry::new("users", 1, "renamed"))
            .unwrap();
        engine
            .record_applied(&LedgerEntry::new("orders", 1, "initial"))
            .unwrap();

        history.load_ledger(&mut engine).unwrap();
        let app = history.app("users").unwrap();
        assert_eq!(app.last_applied(), 1);
        assert!(app.migrations()[0].is_applied());
        assert!(!app.migrations()[1].is_applied());

        let status = history.status();
        assert_eq!(status.len(), 2);
        assert!(status[0].applied && !status[0].persisted);

        engine
            .record_applied(&LedgerEntry::new("users", 5, "future"))
            .unwrap();
        assert!(matches!(
            history.load_ledger(&mut engine),
            Err(MigrationError::NodeOutOfRange { number: 5, .. })
        ));
    }

    #[test]
    fn test_clear() {
        let mut history = History::new();
        history.insert(AppState::new(Application::new("users"), "unused"));
        history.clear();
        assert!(history.apps().is_empty());
        assert!(history.app("users").is_none());
    }
}
