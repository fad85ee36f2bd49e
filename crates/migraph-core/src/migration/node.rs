//! Migration nodes: numbered, named units of schema change.

use super::codec::{NodeRecord, OperationRegistry};
use super::error::{MigrationError, NodeIoError, Result};
use super::operation::Operation;
use super::state::SchemaState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension of node files.
pub const NODE_FILE_EXTENSION: &str = "json";

/// Edge from a node to a node it must follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Application of the referenced node.
    pub app: String,
    /// Identifier of the referenced node (`NNNN_name`).
    pub node: String,
}

impl Dependency {
    /// Create a dependency edge.
    pub fn new(app: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            node: node.into(),
        }
    }
}

/// Resolution progress of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Visit {
    #[default]
    Unvisited,
    InProgress,
    Done,
}

/// A numbered migration belonging to one application.
#[derive(Debug, Clone)]
pub struct Node {
    /// Owning application.
    pub app: String,
    /// 1-based number, unique within the application.
    pub number: u32,
    /// Human-readable name.
    pub name: String,
    /// Operations in application order.
    pub operations: Vec<Operation>,
    /// Nodes that must be applied before this one.
    pub dependencies: Vec<Dependency>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) visit: Visit,
    pub(crate) applied: bool,
}

impl Node {
    /// Create an unpersisted node with no operations or dependencies.
    pub fn new(app: impl Into<String>, number: u32, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            number,
            name: name.into(),
            operations: Vec::new(),
            dependencies: Vec::new(),
            path: None,
            visit: Visit::Unvisited,
            applied: false,
        }
    }

    /// Canonical identifier, `NNNN_name`.
    pub fn id(&self) -> String {
        format!("{:04}_{}", self.number, self.name)
    }

    /// Identifier qualified with the application, used in errors and logs.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app, self.id())
    }

    /// File name this node is stored under.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id(), NODE_FILE_EXTENSION)
    }

    /// Path of the node file, once loaded or saved.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the node has a file on disk.
    pub fn is_persisted(&self) -> bool {
        self.path.is_some()
    }

    /// Whether the node has been folded into its application's state.
    pub fn is_processed(&self) -> bool {
        self.visit == Visit::Done
    }

    /// Whether the database has this node applied.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Add an operation.
    pub fn with_operation(mut self, operation: impl Into<Operation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, app: impl Into<String>, node: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::new(app, node));
        self
    }

    /// Apply every operation's state change to `state`, in order.
    pub(crate) fn fold_into(&self, state: &mut SchemaState) -> Result<()> {
        for op in &self.operations {
            op.set_state(state)
                .map_err(|source| MigrationError::OperationState {
                    node: self.label(),
                    operation: op.op_name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Write the node file into `dir`.
    pub fn save(&mut self, dir: &Path, codec: &OperationRegistry, pretty: bool) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        self.write_file(dir, &path, codec, pretty)
            .map_err(|source| MigrationError::Save {
                node: self.label(),
                source,
            })?;
        info!(app = %self.app, node = %self.id(), path = %path.display(), "saved migration");
        self.path = Some(path.clone());
        Ok(path)
    }

    fn write_file(
        &self,
        dir: &Path,
        path: &Path,
        codec: &OperationRegistry,
        pretty: bool,
    ) -> std::result::Result<(), NodeIoError> {
        if !is_valid_node_name(&self.name) {
            return Err(NodeIoError::Format(format!(
                "invalid migration name {:?}: use ASCII letters, digits and underscores",
                self.name
            )));
        }
        let record = NodeRecord {
            app: self.app.clone(),
            dependencies: self.dependencies.clone(),
            operations: self
                .operations
                .iter()
                .map(|op| codec.encode(op))
                .collect::<std::result::Result<_, _>>()?,
        };
        let mut bytes = if pretty {
            serde_json::to_vec_pretty(&record)?
        } else {
            serde_json::to_vec(&record)?
        };
        bytes.push(b'\n');
        fs::create_dir_all(dir)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a node of `app` from `path`.
    ///
    /// The number and name come from the file name; the application named
    /// inside the file must match `app`.
    pub fn load(app: &str, path: &Path, codec: &OperationRegistry) -> Result<Node> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let label = format!("{}.{}", app, stem);
        let (number, name) = parse_node_id(stem).ok_or_else(|| MigrationError::Load {
            node: label.clone(),
            source: NodeIoError::Format("file name is not NNNN_name".to_string()),
        })?;

        let record = Self::read_file(path).map_err(|source| MigrationError::Load {
            node: label.clone(),
            source,
        })?;
        if record.app != app {
            return Err(MigrationError::Load {
                node: label,
                source: NodeIoError::Format(format!(
                    "file belongs to app {}",
                    record.app
                )),
            });
        }

        let operations = record
            .operations
            .into_iter()
            .map(|op| codec.decode(op))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| MigrationError::Load {
                node: label.clone(),
                source,
            })?;

        debug!(node = %label, operations = operations.len(), "loaded migration");
        let mut node = Node::new(app, number, name);
        node.operations = operations;
        node.dependencies = record.dependencies;
        node.path = Some(path.to_path_buf());
        Ok(node)
    }

    fn read_file(path: &Path) -> std::result::Result<NodeRecord, NodeIoError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Split a node identifier `NNNN_name` into number and name.
///
/// The number needs at least four digits; the name is a non-empty run of
/// ASCII alphanumerics and underscores.
pub fn parse_node_id(id: &str) -> Option<(u32, &str)> {
    let (digits, name) = split_node_prefix(id)?;
    if !is_valid_node_name(name) {
        return None;
    }
    Some((digits.parse().ok()?, name))
}

/// Split `NNNN_rest` at the first underscore if the prefix has at least
/// four digits. The rest is not validated.
pub(crate) fn split_node_prefix(id: &str) -> Option<(&str, &str)> {
    let (digits, rest) = id.split_once('_')?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits, rest))
}

/// Whether `name` can appear after the number in a node file name.
pub fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Numeric prefix of a migrate target such as `0002` or `0002_auto`.
pub fn parse_node_number(name: &str) -> Option<u32> {
    let digits = name.split('_').next()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use crate::migration::operation::{AddIndex, CreateModel};

    #[test]
    fn test_identifiers() {
        let node = Node::new("users", 3, "auto_20240101_120000");
        assert_eq!(node.id(), "0003_auto_20240101_120000");
        assert_eq!(node.label(), "users.0003_auto_20240101_120000");
        assert_eq!(node.file_name(), "0003_auto_20240101_120000.json");
        assert!(!node.is_persisted());
        assert!(!node.is_processed());
        assert!(!node.is_applied());
    }

    #[test]
    fn test_parse_node_id() {
        assert_eq!(parse_node_id("0001_initial"), Some((1, "initial")));
        assert_eq!(parse_node_id("0012_auto_2024"), Some((12, "auto_2024")));
        assert_eq!(parse_node_id("12345_big"), Some((12345, "big")));
        assert_eq!(parse_node_id("001_short"), None);
        assert_eq!(parse_node_id("0001_"), None);
        assert_eq!(parse_node_id("0001"), None);
        assert_eq!(parse_node_id("abcd_initial"), None);
        assert_eq!(parse_node_id("0001_bad-name"), None);
    }

    #[test]
    fn test_parse_node_number() {
        assert_eq!(parse_node_number("0002"), Some(2));
        assert_eq!(parse_node_number("0002_auto"), Some(2));
        assert_eq!(parse_node_number("0000"), Some(0));
        assert_eq!(parse_node_number("latest"), None);
        assert_eq!(parse_node_number(""), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let codec = OperationRegistry::new();

        let mut node = Node::new("blog", 2, "auto_1")
            .with_dependency("blog", "0001_initial")
            .with_dependency("users", "0001_initial")
            .with_operation(CreateModel::new("Post", vec![FieldDef::primary_key("id")]))
            .with_operation(AddIndex::new("Post", "post_id", vec!["id".to_string()]));

        let path = node.save(dir.path(), &codec, true).unwrap();
        assert_eq!(path, dir.path().join("0002_auto_1.json"));
        assert!(node.is_persisted());

        let loaded = Node::load("blog", &path, &codec).unwrap();
        assert_eq!(loaded.number, 2);
        assert_eq!(loaded.name, "auto_1");
        assert_eq!(loaded.dependencies, node.dependencies);
        assert_eq!(loaded.operations, node.operations);
        assert_eq!(loaded.path(), Some(path.as_path()));
    }

    #[test]
    fn test_save_rejects_names_the_loader_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = Node::new("users", 2, "auto_2024-01-01");

        let err = node
            .save(dir.path(), &OperationRegistry::new(), true)
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Save {
                source: NodeIoError::Format(_),
                ..
            }
        ));
        assert!(!node.is_persisted());
        assert!(!dir.path().join("0002_auto_2024-01-01.json").exists());

        assert!(is_valid_node_name("auto_20240101"));
        assert!(!is_valid_node_name(""));
        assert!(!is_valid_node_name("add email"));
    }

    #[test]
    fn test_load_rejects_foreign_app() {
        let dir = tempfile::tempdir().unwrap();
        let codec = OperationRegistry::new();
        let mut node = Node::new("blog", 1, "initial");
        let path = node.save(dir.path(), &codec, false).unwrap();

        let err = Node::load("users", &path, &codec).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Load {
                source: NodeIoError::Format(_),
                ..
            }
        ));
    }

    #[test]
    fn test_load_reports_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let codec = OperationRegistry::new();
        let path = dir.path().join("0001_initial.json");
        std::fs::write(&path, b"{\"app\": \"blog\", \"operations\": [{\"Nope\": {}}]}").unwrap();

        let err = Node::load("blog", &path, &codec).unwrap_err();
        match err {
            MigrationError::Load { node, source } => {
                assert_eq!(node, "blog.0001_initial");
                assert!(matches!(source, NodeIoError::UnknownOperation(name) if name == "Nope"));
            }
            other => panic!("unexpected error: {other}"),
        }

        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            Node::load("blog", &path, &codec),
            Err(MigrationError::Load {
                source: NodeIoError::Json(_),
                ..
            })
        ));
    }
}
