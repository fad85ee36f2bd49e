//! In-process schema engine.

use super::table::{column_names, Table};
use super::{LedgerEntry, SchemaEngine};
use crate::catalog::{FieldDef, ModelDef};
use crate::error::EngineError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    tables: BTreeMap<String, Table>,
    ledger: Option<BTreeMap<(String, u32), LedgerEntry>>,
}

/// A schema engine that keeps tables and the ledger in memory.
///
/// Transactions snapshot the whole catalog on `begin` and restore it on
/// `rollback`. Useful as a reference engine and for tests.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    name: String,
    transactional: bool,
    current: Snapshot,
    saved: Option<Snapshot>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transactional: true,
            current: Snapshot::default(),
            saved: None,
        }
    }

    /// Create an engine that reports no transaction support.
    pub fn without_transactions(name: impl Into<String>) -> Self {
        Self {
            transactional: false,
            ..Self::new(name)
        }
    }

    /// All tables keyed by name.
    pub fn tables(&self) -> &BTreeMap<String, Table> {
        &self.current.tables
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.current.tables.get(name)
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.saved.is_some()
    }

    fn table_mut(&mut self, model: &ModelDef) -> Result<&mut Table, EngineError> {
        let name = model.table_name();
        self.current
            .tables
            .get_mut(name)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    fn ledger_mut(&mut self) -> Result<&mut BTreeMap<(String, u32), LedgerEntry>, EngineError> {
        self.current
            .ledger
            .as_mut()
            .ok_or_else(|| EngineError::TableNotFound("ledger".to_string()))
    }
}

impl SchemaEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if !self.transactional {
            return Err(EngineError::Transaction(
                "transactions are not supported".to_string(),
            ));
        }
        if self.saved.is_some() {
            return Err(EngineError::Transaction(
                "transaction already open".to_string(),
            ));
        }
        self.saved = Some(self.current.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.saved
            .take()
            .map(|_| ())
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        let saved = self
            .saved
            .take()
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))?;
        self.current = saved;
        Ok(())
    }

    fn create_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        let table = Table::from_model(model);
        if self.current.tables.contains_key(&table.name) {
            return Err(EngineError::TableExists(table.name));
        }
        self.current.tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn drop_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        let name = model.table_name();
        self.current
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    fn add_columns(&mut self, model: &ModelDef, fields: &[FieldDef]) -> Result<(), EngineError> {
        self.table_mut(model)?.add_columns(fields)
    }

    fn drop_columns(
        &mut self,
        old: &ModelDef,
        _new: &ModelDef,
        fields: &[String],
    ) -> Result<(), EngineError> {
        let columns = column_names(old, fields);
        self.table_mut(old)?.drop_columns(&columns)
    }

    fn add_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        fields: &[String],
    ) -> Result<(), EngineError> {
        let columns = column_names(model, fields);
        self.table_mut(model)?.add_index(name, columns)
    }

    fn drop_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        _fields: &[String],
    ) -> Result<(), EngineError> {
        self.table_mut(model)?.drop_index(name)
    }

    fn prepare_ledger(&mut self) -> Result<(), EngineError> {
        if self.current.ledger.is_none() {
            self.current.ledger = Some(BTreeMap::new());
        }
        Ok(())
    }

    fn ledger(&self) -> Result<Vec<LedgerEntry>, EngineError> {
        let ledger = self
            .current
            .ledger
            .as_ref()
            .ok_or_else(|| EngineError::TableNotFound("ledger".to_string()))?;
        Ok(ledger.values().cloned().collect())
    }

    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), EngineError> {
        let key = (entry.app.clone(), entry.number);
        let ledger = self.ledger_mut()?;
        if ledger.contains_key(&key) {
            return Err(EngineError::LedgerConflict {
                app: entry.app.clone(),
                number: entry.number,
            });
        }
        ledger.insert(key, entry.clone());
        Ok(())
    }

    fn erase_applied(&mut self, app: &str, number: u32) -> Result<(), EngineError> {
        self.ledger_mut()?.remove(&(app.to_string(), number));
        Ok(())
    }
}
