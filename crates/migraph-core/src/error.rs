//! Schema engine error types.

use thiserror::Error;

/// Errors reported by a schema engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Table already exists.
    #[error("table {0} already exists")]
    TableExists(String),

    /// Table does not exist.
    #[error("table {0} does not exist")]
    TableNotFound(String),

    /// Column already exists.
    #[error("column {column} already exists on {table}")]
    ColumnExists {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Column does not exist.
    #[error("column {column} does not exist on {table}")]
    ColumnNotFound {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Index already exists.
    #[error("index {index} already exists on {table}")]
    IndexExists {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// Index does not exist.
    #[error("index {index} does not exist on {table}")]
    IndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// Ledger row already recorded.
    #[error("migration {app}#{number} is already recorded")]
    LedgerConflict {
        /// Application name.
        app: String,
        /// Node number.
        number: u32,
    },

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Failure raised by an engine on purpose (test doubles, dry runs).
    #[error("engine failure: {0}")]
    Injected(String),
}
