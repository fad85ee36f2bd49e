//! Migraph Core - schema migrations as a dependency graph.
//!
//! This crate records each application's schema history as numbered
//! migration nodes, generates new nodes by diffing live model definitions
//! against the recorded ones, and applies or reverses nodes on a schema
//! engine inside transactions.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod migration;
pub mod migrator;

pub use catalog::{
    Application, DefaultValue, FieldDef, FieldType, IndexDef, ModelDef, ModelRegistry, Registry,
    ScalarType,
};
pub use config::{EngineConfig, MigrationConfig};
pub use engine::{LedgerEntry, MemoryEngine, SchemaEngine, SledEngine, Table};
pub use error::EngineError;
pub use migration::{
    AppState, CustomOperation, History, MigrationError, Node, NodeKey, NodeStatus, Operation,
    OperationRegistry, SchemaState,
};
pub use migrator::{MakeOptions, Migrator, RunOptions};
