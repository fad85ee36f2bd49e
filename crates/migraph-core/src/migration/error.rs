//! Migration error types.

use crate::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while folding an operation into a model state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Model not present in the state.
    #[error("model {model} not found")]
    ModelNotFound {
        /// Model name.
        model: String,
    },

    /// Model already present in the state.
    #[error("duplicate model {model}")]
    DuplicateModel {
        /// Model name.
        model: String,
    },

    /// Field not present on the model.
    #[error("field {model}.{field} not found")]
    FieldNotFound {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// Field already present on the model.
    #[error("duplicate field {model}.{field}")]
    DuplicateField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// Index not present on the model.
    #[error("index {index} not found on {model}")]
    IndexNotFound {
        /// Model name.
        model: String,
        /// Index name.
        index: String,
    },

    /// Index name already used on the model.
    #[error("duplicate index {index} on {model}")]
    DuplicateIndex {
        /// Model name.
        model: String,
        /// Index name.
        index: String,
    },

    /// Field cannot be removed while an index covers it.
    #[error("field {model}.{field} is used by index {index}")]
    FieldIndexed {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Index name.
        index: String,
    },

    /// Failure reported by an externally registered operation.
    #[error("{0}")]
    Custom(String),
}

/// Errors raised while running an operation against a schema engine.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The model state needed by the operation is inconsistent.
    #[error(transparent)]
    State(#[from] StateError),

    /// The schema engine rejected a call.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors raised while reading or writing a node file.
#[derive(Debug, Error)]
pub enum NodeIoError {
    /// File system error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid JSON that is not a node record.
    #[error("invalid node record: {0}")]
    Format(String),

    /// Operation record with a name nobody registered.
    #[error("unknown operation {0}")]
    UnknownOperation(String),
}

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Application not registered.
    #[error("app {app} not found")]
    AppNotFound {
        /// Application name.
        app: String,
    },

    /// Application has no nodes to run.
    #[error("app {app} has no migrations")]
    NoMigrations {
        /// Application name.
        app: String,
    },

    /// Node name that does not start with a node number.
    #[error("invalid migration name {name} for app {app}")]
    InvalidNodeName {
        /// Application name.
        app: String,
        /// Requested name.
        name: String,
    },

    /// Node number outside the application's sequence.
    #[error("migration {number:04} not found for app {app}")]
    NodeOutOfRange {
        /// Application name.
        app: String,
        /// Requested number.
        number: u32,
    },

    /// Two node files share a number.
    #[error("duplicate migration number {number:04} for app {app}")]
    DuplicateNode {
        /// Application name.
        app: String,
        /// Node number.
        number: u32,
    },

    /// Node numbering has a gap.
    #[error("migration {number:04} missing for app {app}")]
    MissingNode {
        /// Application name.
        app: String,
        /// Missing number.
        number: u32,
    },

    /// Dependency edge that does not point at a known node.
    #[error("{node}: invalid dependency {dep_app}.{dep_node}: {reason}")]
    InvalidDependency {
        /// Node declaring the edge (`app.NNNN_name`).
        node: String,
        /// Referenced application.
        dep_app: String,
        /// Referenced node identifier.
        dep_node: String,
        /// Why the edge is invalid.
        reason: String,
    },

    /// Dependency cycle.
    #[error("{node}: circular dependency on {dependency}")]
    CircularDependency {
        /// Node declaring the edge that closes the cycle.
        node: String,
        /// Node the edge points at.
        dependency: String,
    },

    /// Listing a node directory failed.
    #[error("cannot read {}: {source}", .path.display())]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Loading a node file failed.
    #[error("{node}: load error: {source}")]
    Load {
        /// Node identity (`app.NNNN_name`).
        node: String,
        /// Underlying error.
        #[source]
        source: NodeIoError,
    },

    /// Saving a node file failed.
    #[error("{node}: save error: {source}")]
    Save {
        /// Node identity (`app.NNNN_name`).
        node: String,
        /// Underlying error.
        #[source]
        source: NodeIoError,
    },

    /// An operation could not be folded into the model state.
    #[error("{node}: {operation}: {source}")]
    OperationState {
        /// Node identity.
        node: String,
        /// Operation name.
        operation: String,
        /// Underlying error.
        #[source]
        source: StateError,
    },

    /// An operation failed against the schema engine.
    #[error("{node}: {operation} failed on {database}: {source}")]
    OperationRun {
        /// Node identity.
        node: String,
        /// Operation name.
        operation: String,
        /// Database identifier.
        database: String,
        /// Underlying error.
        #[source]
        source: OperationError,
    },

    /// Schema engine or ledger failure outside an operation.
    #[error("database {database}: {source}")]
    Database {
        /// Database identifier.
        database: String,
        /// Underlying error.
        #[source]
        source: EngineError,
    },

    /// Rolling back a failed node failed as well; the database may be
    /// left partially migrated.
    #[error("database {database}: rollback of {node} failed: {source} (after: {cause})")]
    RollbackFailed {
        /// Database identifier.
        database: String,
        /// Node identity.
        node: String,
        /// Rollback error.
        #[source]
        source: EngineError,
        /// Error that triggered the rollback.
        cause: Box<MigrationError>,
    },

    /// Operation name registered twice.
    #[error("operation {0} already registered")]
    DuplicateOperation(String),

    /// A node was requested without naming its application.
    #[error("a migration name requires an app")]
    NodeWithoutApp,
}

/// Result alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    pub(crate) fn database(database: &str, source: EngineError) -> Self {
        MigrationError::Database {
            database: database.to_string(),
            source,
        }
    }
}
