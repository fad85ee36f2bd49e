//! Migration engine.
//!
//! Applications record their schema history as numbered nodes, each a list
//! of operations plus dependencies on earlier nodes (possibly in other
//! applications):
//! - Diffing recorded models against live ones to produce new nodes
//! - Resolving the dependency graph, with cycle detection
//! - Applying and reversing nodes transactionally, tracked in a ledger
//!
//! # Example
//!
//! ```ignore
//! use migraph_core::migration::{History, OperationRegistry};
//!
//! let codec = OperationRegistry::new();
//! let mut history = History::load(&registry, &config, &codec)?;
//! history.make_migrations("users", &config)?;
//! history.save_pending("users", &codec, &config)?;
//! history.load_ledger(&mut engine)?;
//! history.migrate("users", None, &mut engine)?;
//! ```

pub mod codec;
pub mod diff;
pub mod error;
mod executor;
pub mod history;
pub mod node;
pub mod operation;
mod resolver;
pub mod state;

// Operation types
pub use codec::{OperationDecoder, OperationRegistry};
pub use operation::{
    AddFields, AddIndex, CreateModel, CustomOperation, DeleteModel, Operation, RemoveFields,
    RemoveIndex,
};

// Node and history types
pub use history::{History, NodeKey, NodeStatus};
pub use node::{
    is_valid_node_name, parse_node_id, parse_node_number, Dependency, Node, NODE_FILE_EXTENSION,
};
pub use state::{AppState, MigrationTarget, SchemaState};

// Diff
pub use diff::diff_models;

// Error types
pub use error::{MigrationError, NodeIoError, OperationError, Result, StateError};
