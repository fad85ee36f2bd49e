//! Shared helpers for integration tests.
#![allow(dead_code)]

use migraph_core::catalog::{Application, FieldDef, FieldType, Registry, ScalarType};
use migraph_core::engine::{LedgerEntry, MemoryEngine, SchemaEngine};
use migraph_core::error::EngineError;
use migraph_core::migration::{Node, OperationRegistry};
use migraph_core::{MigrationConfig, Migrator, ModelDef};
use std::path::Path;

/// A `MemoryEngine` that records calls and can fail on demand.
pub struct RecordingEngine {
    pub inner: MemoryEngine,
    /// DDL and transaction calls, in order.
    pub calls: Vec<String>,
    /// Ledger rows inserted, in order.
    pub ledger_inserts: Vec<(String, u32)>,
    pub rollbacks: usize,
    fail_at: Option<usize>,
    ddl_calls: usize,
    fail_commit: bool,
    fail_rollback: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::wrap(MemoryEngine::new("recording"))
    }

    pub fn without_transactions() -> Self {
        Self::wrap(MemoryEngine::without_transactions("recording"))
    }

    fn wrap(inner: MemoryEngine) -> Self {
        Self {
            inner,
            calls: Vec::new(),
            ledger_inserts: Vec::new(),
            rollbacks: 0,
            fail_at: None,
            ddl_calls: 0,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    /// Fail the `n`th DDL call (1-based) from now on.
    pub fn fail_on_ddl(mut self, n: usize) -> Self {
        self.fail_at = Some(self.ddl_calls + n);
        self
    }

    /// Fail every commit, leaving the transaction open.
    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Report every rollback as failed. The inner transaction is still discarded.
    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    fn ddl(&mut self, call: String) -> Result<(), EngineError> {
        self.ddl_calls += 1;
        self.calls.push(call.clone());
        if self.fail_at == Some(self.ddl_calls) {
            return Err(EngineError::Injected(call));
        }
        Ok(())
    }
}

impl SchemaEngine for RecordingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_transactions(&self) -> bool {
        self.inner.supports_transactions()
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        self.calls.push("begin".to_string());
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.calls.push("commit".to_string());
        if self.fail_commit {
            return Err(EngineError::Injected("commit".to_string()));
        }
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        self.calls.push("rollback".to_string());
        self.rollbacks += 1;
        self.inner.rollback()?;
        if self.fail_rollback {
            return Err(EngineError::Injected("rollback".to_string()));
        }
        Ok(())
    }

    fn create_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        self.ddl(format!("create_table {}", model.table_name()))?;
        self.inner.create_table(model)
    }

    fn drop_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        self.ddl(format!("drop_table {}", model.table_name()))?;
        self.inner.drop_table(model)
    }

    fn add_columns(&mut self, model: &ModelDef, fields: &[FieldDef]) -> Result<(), EngineError> {
        self.ddl(format!("add_columns {}", model.table_name()))?;
        self.inner.add_columns(model, fields)
    }

    fn drop_columns(
        &mut self,
        old: &ModelDef,
        new: &ModelDef,
        fields: &[String],
    ) -> Result<(), EngineError> {
        self.ddl(format!("drop_columns {}", old.table_name()))?;
        self.inner.drop_columns(old, new, fields)
    }

    fn add_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        fields: &[String],
    ) -> Result<(), EngineError> {
        self.ddl(format!("add_index {}", name))?;
        self.inner.add_index(model, name, fields)
    }

    fn drop_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        fields: &[String],
    ) -> Result<(), EngineError> {
        self.ddl(format!("drop_index {}", name))?;
        self.inner.drop_index(model, name, fields)
    }

    fn prepare_ledger(&mut self) -> Result<(), EngineError> {
        self.inner.prepare_ledger()
    }

    fn ledger(&self) -> Result<Vec<LedgerEntry>, EngineError> {
        self.inner.ledger()
    }

    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), EngineError> {
        self.inner.record_applied(entry)?;
        self.ledger_inserts.push((entry.app.clone(), entry.number));
        Ok(())
    }

    fn erase_applied(&mut self, app: &str, number: u32) -> Result<(), EngineError> {
        self.inner.erase_applied(app, number)
    }
}

pub fn string_field(name: &str) -> FieldDef {
    FieldDef::new(name, FieldType::scalar(ScalarType::string()))
}

/// Save `node` under `<root>/<app>`.
pub fn write_node(root: &Path, node: Node) {
    write_node_with(root, node, &OperationRegistry::new());
}

pub fn write_node_with(root: &Path, mut node: Node, codec: &OperationRegistry) {
    let dir = root.join(&node.app);
    node.save(&dir, codec, true).unwrap();
}

/// Migrator over `apps` with node files under `root`.
pub fn migrator(root: &Path, apps: Vec<Application>) -> Migrator {
    let registry = apps
        .into_iter()
        .fold(Registry::new(), |registry, app| registry.with_app(app));
    Migrator::new(registry, MigrationConfig::new(root))
}

/// Ledger rows as `(app, number)` pairs.
pub fn ledger_rows(engine: &RecordingEngine) -> Vec<(String, u32)> {
    engine
        .ledger()
        .unwrap()
        .into_iter()
        .map(|row| (row.app, row.number))
        .collect()
}
