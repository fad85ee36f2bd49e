//! Schema engine interface and bundled engines.
//!
//! A [`SchemaEngine`] is the only way the migration engine touches a
//! database: table/column/index DDL, a transaction lifecycle, and the
//! applied-migration ledger. The ledger is written through the same engine
//! so that a node's DDL and its ledger row commit or roll back together.

mod ledger;
mod memory;
mod sled_engine;
mod table;

pub use ledger::LedgerEntry;
pub use memory::MemoryEngine;
pub use sled_engine::SledEngine;
pub use table::Table;

use crate::catalog::{FieldDef, ModelDef};
use crate::error::EngineError;

/// Database schema operations used by migrations.
///
/// Model arguments always carry a resolved table name. Field name slices
/// refer to model field names, not column names.
pub trait SchemaEngine {
    /// Identifier used in error messages and logs.
    fn name(&self) -> &str;

    /// Whether [`begin`](Self::begin)/[`commit`](Self::commit) give atomicity.
    ///
    /// When this returns false, nodes run without a transaction wrapper.
    fn supports_transactions(&self) -> bool {
        true
    }

    /// Begin a transaction.
    fn begin(&mut self) -> Result<(), EngineError>;

    /// Commit the open transaction.
    ///
    /// A failed commit leaves the transaction open for [`rollback`](Self::rollback).
    fn commit(&mut self) -> Result<(), EngineError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), EngineError>;

    /// Create the table for `model` with all of its fields.
    fn create_table(&mut self, model: &ModelDef) -> Result<(), EngineError>;

    /// Drop the table for `model`.
    fn drop_table(&mut self, model: &ModelDef) -> Result<(), EngineError>;

    /// Add `fields` as columns of `model`'s table.
    fn add_columns(&mut self, model: &ModelDef, fields: &[FieldDef]) -> Result<(), EngineError>;

    /// Drop the named fields' columns.
    ///
    /// `old` is the model before the drop and `new` the model after it;
    /// engines without a native column drop rebuild the table from `new`
    /// and copy the surviving columns out of `old`.
    fn drop_columns(
        &mut self,
        old: &ModelDef,
        new: &ModelDef,
        fields: &[String],
    ) -> Result<(), EngineError>;

    /// Create index `name` over `fields`.
    fn add_index(&mut self, model: &ModelDef, name: &str, fields: &[String])
        -> Result<(), EngineError>;

    /// Drop index `name`.
    fn drop_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        fields: &[String],
    ) -> Result<(), EngineError>;

    /// Create the ledger storage if it does not exist yet.
    fn prepare_ledger(&mut self) -> Result<(), EngineError>;

    /// All ledger rows, ordered by application then node number.
    fn ledger(&self) -> Result<Vec<LedgerEntry>, EngineError>;

    /// Record a node as applied.
    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), EngineError>;

    /// Remove the ledger row for a reversed node.
    fn erase_applied(&mut self, app: &str, number: u32) -> Result<(), EngineError>;
}
