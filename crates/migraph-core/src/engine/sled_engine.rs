//! Persistent schema engine backed by sled.

use super::table::{column_names, Table};
use super::{LedgerEntry, SchemaEngine};
use crate::catalog::{FieldDef, ModelDef};
use crate::config::EngineConfig;
use crate::error::EngineError;
use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};

/// Tree name for table definitions.
const TABLES_TREE: &str = "schema:tables";

/// Tree name for the applied-migration ledger.
const LEDGER_TREE: &str = "schema:ledger";

/// Key in the meta tree marking the ledger as created.
const LEDGER_READY_KEY: &[u8] = b"ledger_ready";

/// Tree name for engine metadata.
const META_TREE: &str = "schema:meta";

/// A write staged inside an open transaction.
#[derive(Debug, Clone)]
enum StagedWrite {
    Table { key: String, value: Option<Vec<u8>> },
    Ledger { key: Vec<u8>, value: Option<Vec<u8>> },
}

/// A schema engine that persists its catalog and ledger in sled.
///
/// Writes made inside a transaction are staged in memory and applied to
/// all trees in one sled transaction on commit.
pub struct SledEngine {
    name: String,
    db: Db,
    tables: Tree,
    ledger: Tree,
    meta: Tree,
    staged: Option<Vec<StagedWrite>>,
}

impl SledEngine {
    /// Open or create an engine with the given configuration.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let db = config.to_sled_config().open()?;
        Self::from_db(config.name, db)
    }

    /// Wrap an already open sled database.
    pub fn from_db(name: impl Into<String>, db: Db) -> Result<Self, EngineError> {
        let tables = db.open_tree(TABLES_TREE)?;
        let ledger = db.open_tree(LEDGER_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self {
            name: name.into(),
            db,
            tables,
            ledger,
            meta,
            staged: None,
        })
    }

    /// Read a table definition, seeing writes staged in the open transaction.
    pub fn table(&self, name: &str) -> Result<Option<Table>, EngineError> {
        if let Some(staged) = &self.staged {
            for write in staged.iter().rev() {
                if let StagedWrite::Table { key, value } = write {
                    if key == name {
                        return value.as_deref().map(Self::decode_table).transpose();
                    }
                }
            }
        }
        self.tables
            .get(name.as_bytes())?
            .map(|bytes| Self::decode_table(&bytes))
            .transpose()
    }

    /// Names of all committed tables.
    pub fn table_names(&self) -> Result<Vec<String>, EngineError> {
        let mut names = Vec::new();
        for result in self.tables.iter() {
            let (key, _) = result?;
            names.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(names)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.db.flush()?;
        Ok(())
    }

    fn ledger_ready(&self) -> Result<bool, EngineError> {
        Ok(self.meta.contains_key(LEDGER_READY_KEY)?)
    }

    fn ledger_contains(&self, key: &[u8]) -> Result<bool, EngineError> {
        if let Some(staged) = &self.staged {
            for write in staged.iter().rev() {
                if let StagedWrite::Ledger { key: k, value } = write {
                    if k.as_slice() == key {
                        return Ok(value.is_some());
                    }
                }
            }
        }
        Ok(self.ledger.contains_key(key)?)
    }

    fn existing_table(&self, model: &ModelDef) -> Result<Table, EngineError> {
        let name = model.table_name();
        self.table(name)?
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    fn write(&mut self, write: StagedWrite) -> Result<(), EngineError> {
        if let Some(staged) = &mut self.staged {
            staged.push(write);
            return Ok(());
        }
        match write {
            StagedWrite::Table { key, value: Some(v) } => {
                self.tables.insert(key.as_bytes(), v)?;
            }
            StagedWrite::Table { key, value: None } => {
                self.tables.remove(key.as_bytes())?;
            }
            StagedWrite::Ledger { key, value: Some(v) } => {
                self.ledger.insert(key, v)?;
            }
            StagedWrite::Ledger { key, value: None } => {
                self.ledger.remove(key)?;
            }
        }
        Ok(())
    }

    fn put_table(&mut self, table: &Table) -> Result<(), EngineError> {
        let value = Self::encode_table(table)?;
        self.write(StagedWrite::Table {
            key: table.name.clone(),
            value: Some(value),
        })
    }

    fn encode_table(table: &Table) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(table).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    fn decode_table(bytes: &[u8]) -> Result<Table, EngineError> {
        serde_json::from_slice(bytes).map_err(|e| EngineError::Deserialization(e.to_string()))
    }
}

impl SchemaEngine for SledEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if self.staged.is_some() {
            return Err(EngineError::Transaction(
                "transaction already open".to_string(),
            ));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))?;
        if staged.is_empty() {
            return Ok(());
        }

        let result: Result<(), TransactionError<EngineError>> = (&self.tables, &self.ledger)
            .transaction(|(tables_tx, ledger_tx)| {
                for write in &staged {
                    match write {
                        StagedWrite::Table { key, value: Some(v) } => {
                            tables_tx.insert(key.as_bytes(), v.clone())?;
                        }
                        StagedWrite::Table { key, value: None } => {
                            tables_tx.remove(key.as_bytes())?;
                        }
                        StagedWrite::Ledger { key, value: Some(v) } => {
                            ledger_tx.insert(key.clone(), v.clone())?;
                        }
                        StagedWrite::Ledger { key, value: None } => {
                            ledger_tx.remove(key.clone())?;
                        }
                    }
                }
                Ok(())
            });

        let err = match result {
            Ok(()) => return Ok(()),
            Err(TransactionError::Abort(e)) => e,
            Err(TransactionError::Storage(e)) => EngineError::Storage(e),
        };
        self.staged = Some(staged);
        Err(err)
    }

    fn rollback(&mut self) -> Result<(), EngineError> {
        self.staged
            .take()
            .map(|_| ())
            .ok_or_else(|| EngineError::Transaction("no open transaction".to_string()))
    }

    fn create_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        let table = Table::from_model(model);
        if self.table(&table.name)?.is_some() {
            return Err(EngineError::TableExists(table.name));
        }
        self.put_table(&table)
    }

    fn drop_table(&mut self, model: &ModelDef) -> Result<(), EngineError> {
        let table = self.existing_table(model)?;
        self.write(StagedWrite::Table {
            key: table.name,
            value: None,
        })
    }

    fn add_columns(&mut self, model: &ModelDef, fields: &[FieldDef]) -> Result<(), EngineError> {
        let mut table = self.existing_table(model)?;
        table.add_columns(fields)?;
        self.put_table(&table)
    }

    fn drop_columns(
        &mut self,
        old: &ModelDef,
        _new: &ModelDef,
        fields: &[String],
    ) -> Result<(), EngineError> {
        let mut table = self.existing_table(old)?;
        table.drop_columns(&column_names(old, fields))?;
        self.put_table(&table)
    }

    fn add_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        fields: &[String],
    ) -> Result<(), EngineError> {
        let mut table = self.existing_table(model)?;
        table.add_index(name, column_names(model, fields))?;
        self.put_table(&table)
    }

    fn drop_index(
        &mut self,
        model: &ModelDef,
        name: &str,
        _fields: &[String],
    ) -> Result<(), EngineError> {
        let mut table = self.existing_table(model)?;
        table.drop_index(name)?;
        self.put_table(&table)
    }

    fn prepare_ledger(&mut self) -> Result<(), EngineError> {
        if !self.ledger_ready()? {
            self.meta.insert(LEDGER_READY_KEY, &[1u8])?;
        }
        Ok(())
    }

    fn ledger(&self) -> Result<Vec<LedgerEntry>, EngineError> {
        if !self.ledger_ready()? {
            return Err(EngineError::TableNotFound("ledger".to_string()));
        }
        let mut entries = Vec::new();
        for result in self.ledger.iter() {
            let (_, value) = result?;
            entries.push(LedgerEntry::from_bytes(&value)?);
        }
        Ok(entries)
    }

    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), EngineError> {
        if !self.ledger_ready()? {
            return Err(EngineError::TableNotFound("ledger".to_string()));
        }
        let key = LedgerEntry::key(&entry.app, entry.number);
        if self.ledger_contains(&key)? {
            return Err(EngineError::LedgerConflict {
                app: entry.app.clone(),
                number: entry.number,
            });
        }
        let value = entry.to_bytes()?;
        self.write(StagedWrite::Ledger {
            key,
            value: Some(value),
        })
    }

    fn erase_applied(&mut self, app: &str, number: u32) -> Result<(), EngineError> {
        if !self.ledger_ready()? {
            return Err(EngineError::TableNotFound("ledger".to_string()));
        }
        self.write(StagedWrite::Ledger {
            key: LedgerEntry::key(app, number),
            value: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldType, ScalarType};

    fn test_engine() -> SledEngine {
        SledEngine::open(EngineConfig::temporary().with_name("sled-test")).unwrap()
    }

    fn user_model() -> ModelDef {
        ModelDef::new("User")
            .with_table("users_user")
            .with_field(FieldDef::primary_key("id"))
            .with_field(FieldDef::new("email", FieldType::scalar(ScalarType::string())))
    }

    #[test]
    fn test_ddl_without_transaction() {
        let mut engine = test_engine();
        engine.create_table(&user_model()).unwrap();
        engine
            .add_index(&user_model(), "by_email", &["email".to_string()])
            .unwrap();

        let table = engine.table("users_user").unwrap().unwrap();
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.indexes["by_email"], vec!["email"]);
        assert_eq!(engine.table_names().unwrap(), vec!["users_user"]);

        assert!(matches!(
            engine.create_table(&user_model()),
            Err(EngineError::TableExists(_))
        ));
    }

    #[test]
    fn test_staged_writes_visible_until_rollback() {
        let mut engine = test_engine();
        engine.prepare_ledger().unwrap();

        engine.begin().unwrap();
        engine.create_table(&user_model()).unwrap();
        engine
            .record_applied(&LedgerEntry::new("users", 1, "initial"))
            .unwrap();
        assert!(engine.table("users_user").unwrap().is_some());
        assert!(engine.tables.is_empty());

        engine.rollback().unwrap();
        assert!(engine.table("users_user").unwrap().is_none());
        assert!(engine.ledger().unwrap().is_empty());
    }

    #[test]
    fn test_commit_applies_all_trees() {
        let mut engine = test_engine();
        engine.prepare_ledger().unwrap();

        engine.begin().unwrap();
        engine.create_table(&user_model()).unwrap();
        engine
            .record_applied(&LedgerEntry::new("users", 1, "initial"))
            .unwrap();
        engine.commit().unwrap();

        assert!(engine.table("users_user").unwrap().is_some());
        let ledger = engine.ledger().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].name, "initial");

        engine.begin().unwrap();
        engine.erase_applied("users", 1).unwrap();
        engine.drop_table(&user_model()).unwrap();
        engine.commit().unwrap();
        assert!(engine.ledger().unwrap().is_empty());
        assert!(engine.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = SledEngine::open(EngineConfig::new(dir.path())).unwrap();
            engine.prepare_ledger().unwrap();
            engine
                .record_applied(&LedgerEntry::new("users", 1, "initial"))
                .unwrap();
            engine.flush().unwrap();
        }

        let engine = SledEngine::open(EngineConfig::new(dir.path())).unwrap();
        let ledger = engine.ledger().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].app, "users");
    }
}
