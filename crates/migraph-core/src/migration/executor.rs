//! Applying and reversing nodes against a schema engine.

use super::error::{MigrationError, Result};
use super::history::{History, NodeKey};
use super::node::Node;
use super::state::{MigrationTarget, SchemaState};
use crate::engine::{LedgerEntry, SchemaEngine};
use tracing::{debug, info, warn};

impl History {
    /// Bring `app` to `node` (default: its last node) on `engine`.
    ///
    /// Targets before the applied cursor reverse every later node;
    /// targets after it apply everything up to and including the target.
    pub fn migrate(
        &mut self,
        app: &str,
        node: Option<&str>,
        engine: &mut dyn SchemaEngine,
    ) -> Result<()> {
        self.drive(app, node, engine, false)
    }

    /// Like [`migrate`](Self::migrate), but only the ledger changes.
    pub fn fake(&mut self, app: &str, node: Option<&str>, engine: &mut dyn SchemaEngine) -> Result<()> {
        self.drive(app, node, engine, true)
    }

    fn drive(
        &mut self,
        app: &str,
        node: Option<&str>,
        engine: &mut dyn SchemaEngine,
        fake: bool,
    ) -> Result<()> {
        let position = self.position(app)?;
        match self.apps[position].target(node)? {
            MigrationTarget::Current => {
                debug!(app, "nothing to migrate");
                Ok(())
            }
            MigrationTarget::Forward(index) => {
                for node in 0..=index {
                    self.run_node(NodeKey { app: position, node }, engine, fake)?;
                }
                Ok(())
            }
            MigrationTarget::Backward(index) => {
                let len = self.apps[position].migrations.len();
                for node in (index..len).rev() {
                    self.backwards_node(NodeKey { app: position, node }, engine, fake)?;
                }
                Ok(())
            }
        }
    }

    /// Apply a node after its dependencies. Applied nodes are skipped.
    pub fn run_node(&mut self, key: NodeKey, engine: &mut dyn SchemaEngine, fake: bool) -> Result<()> {
        if self.node(key).is_applied() {
            return Ok(());
        }
        if !self.node(key).is_processed() {
            self.resolve(key)?;
        }

        let dependencies = self.node(key).dependencies.clone();
        for dependency in &dependencies {
            let target = self.dependency_key(key, dependency)?;
            self.run_node(target, engine, fake)?;
        }

        let database = engine.name().to_string();
        let app = &self.apps[key.app];
        let node = &app.migrations[key.node];
        let base = if fake {
            None
        } else {
            Some(app.state_before(key.node)?)
        };
        transactional(engine, node, |engine| {
            if let Some(base) = base {
                apply_operations(node, base, engine, &database)?;
            }
            engine
                .record_applied(&LedgerEntry::new(&node.app, node.number, &node.name))
                .map_err(|e| MigrationError::database(&database, e))
        })?;
        info!(app = %node.app, node = %node.id(), database = %database, fake, "applied migration");

        self.node_mut(key).applied = true;
        self.refresh_cursor(key.app);
        Ok(())
    }

    /// Reverse a node after everything that depends on it. Unapplied
    /// nodes are skipped.
    pub fn backwards_node(
        &mut self,
        key: NodeKey,
        engine: &mut dyn SchemaEngine,
        fake: bool,
    ) -> Result<()> {
        if !self.node(key).is_applied() {
            return Ok(());
        }

        let dependents = self.dependents(key).to_vec();
        for dependent in dependents.into_iter().rev() {
            self.backwards_node(dependent, engine, fake)?;
        }

        let database = engine.name().to_string();
        let app = &self.apps[key.app];
        let node = &app.migrations[key.node];
        let base = if fake {
            None
        } else {
            Some(app.state_before(key.node)?)
        };
        transactional(engine, node, |engine| {
            if let Some(base) = base {
                reverse_operations(node, base, engine, &database)?;
            }
            engine
                .erase_applied(&node.app, node.number)
                .map_err(|e| MigrationError::database(&database, e))
        })?;
        info!(app = %node.app, node = %node.id(), database = %database, fake, "reversed migration");

        self.node_mut(key).applied = false;
        self.refresh_cursor(key.app);
        Ok(())
    }

    fn refresh_cursor(&mut self, app: usize) {
        let app = &mut self.apps[app];
        app.last_applied = app
            .migrations
            .iter()
            .filter(|n| n.applied)
            .map(|n| n.number)
            .max()
            .unwrap_or(0);
    }
}

/// Run `node`'s operations in order, starting from `base`.
fn apply_operations(
    node: &Node,
    base: SchemaState,
    engine: &mut dyn SchemaEngine,
    database: &str,
) -> Result<()> {
    let mut before = base;
    for op in &node.operations {
        let mut after = before.clone();
        op.set_state(&mut after)
            .map_err(|source| MigrationError::OperationState {
                node: node.label(),
                operation: op.op_name().to_string(),
                source,
            })?;
        op.run(engine, &after, &before)
            .map_err(|source| MigrationError::OperationRun {
                node: node.label(),
                operation: op.op_name().to_string(),
                database: database.to_string(),
                source,
            })?;
        before = after;
    }
    Ok(())
}

/// Reverse `node`'s operations, last first. `base` is the state before
/// the node.
fn reverse_operations(
    node: &Node,
    base: SchemaState,
    engine: &mut dyn SchemaEngine,
    database: &str,
) -> Result<()> {
    // states[i] is the state before operation i
    let mut states = Vec::with_capacity(node.operations.len() + 1);
    let mut current = base;
    for op in &node.operations {
        let mut next = current.clone();
        op.set_state(&mut next)
            .map_err(|source| MigrationError::OperationState {
                node: node.label(),
                operation: op.op_name().to_string(),
                source,
            })?;
        states.push(current);
        current = next;
    }
    states.push(current);

    for (i, op) in node.operations.iter().enumerate().rev() {
        op.backwards(engine, &states[i + 1], &states[i])
            .map_err(|source| MigrationError::OperationRun {
                node: node.label(),
                operation: op.op_name().to_string(),
                database: database.to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Run `body` in one engine transaction, rolling back if it or the commit fails.
///
/// Engines without transactions run `body` directly.
fn transactional<F>(engine: &mut dyn SchemaEngine, node: &Node, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn SchemaEngine) -> Result<()>,
{
    let database = engine.name().to_string();
    if !engine.supports_transactions() {
        warn!(database = %database, node = %node.label(), "engine has no transactions; running unguarded");
        return body(&mut *engine);
    }

    engine
        .begin()
        .map_err(|e| MigrationError::database(&database, e))?;
    let cause = match body(&mut *engine) {
        Ok(()) => match engine.commit() {
            Ok(()) => return Ok(()),
            Err(e) => MigrationError::database(&database, e),
        },
        Err(cause) => cause,
    };
    warn!(database = %database, node = %node.label(), error = %cause, "rolling back migration");
    match engine.rollback() {
        Ok(()) => Err(cause),
        Err(source) => Err(MigrationError::RollbackFailed {
            database,
            node: node.label(),
            source,
            cause: Box::new(cause),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Application, FieldDef, FieldType, ScalarType};
    use crate::engine::MemoryEngine;
    use crate::migration::operation::{AddFields, AddIndex, CreateModel};
    use crate::migration::state::AppState;

    fn users_history() -> History {
        let email = FieldDef::new("email", FieldType::scalar(ScalarType::string()));
        let mut app = AppState::new(Application::new("users"), "unused");
        app.migrations = vec![
            Node::new("users", 1, "initial")
                .with_operation(CreateModel::new("User", vec![FieldDef::primary_key("id")])),
            Node::new("users", 2, "email")
                .with_operation(AddFields::new("User", vec![email]))
                .with_operation(AddIndex::new("User", "user_email", vec!["email".into()]))
                .with_dependency("users", "0001_initial"),
        ];
        let mut history = History::new();
        history.insert(app);
        history.resolve_all().unwrap();
        history
    }

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new("default");
        engine.prepare_ledger().unwrap();
        engine
    }

    #[test]
    fn test_migrate_forward_and_back() {
        let mut history = users_history();
        let mut engine = engine();

        history.migrate("users", None, &mut engine).unwrap();
        let table = engine.table("users_user").unwrap();
        assert!(table.columns.contains_key("email"));
        assert_eq!(table.indexes["user_email"], vec!["email".to_string()]);
        assert_eq!(history.app("users").unwrap().last_applied(), 2);
        assert_eq!(engine.ledger().unwrap().len(), 2);

        history.migrate("users", Some("0001"), &mut engine).unwrap();
        let table = engine.table("users_user").unwrap();
        assert!(!table.columns.contains_key("email"));
        assert!(table.indexes.is_empty());
        assert_eq!(history.app("users").unwrap().last_applied(), 1);

        history.migrate("users", Some("0000"), &mut engine).unwrap();
        assert!(engine.tables().is_empty());
        assert!(engine.ledger().unwrap().is_empty());
        assert_eq!(history.app("users").unwrap().last_applied(), 0);
    }

    #[test]
    fn test_fake_only_touches_ledger() {
        let mut history = users_history();
        let mut engine = engine();

        history.fake("users", None, &mut engine).unwrap();
        assert!(engine.tables().is_empty());
        assert_eq!(engine.ledger().unwrap().len(), 2);

        history.fake("users", Some("0000"), &mut engine).unwrap();
        assert!(engine.ledger().unwrap().is_empty());
        assert!(history
            .app("users")
            .unwrap()
            .migrations()
            .iter()
            .all(|n| !n.is_applied()));
    }

    #[test]
    fn test_failed_node_rolls_back() {
        let mut history = users_history();
        let mut engine = engine();
        // a table already in the way makes CreateModel fail
        engine
            .create_table(&crate::catalog::ModelDef::new("User").with_table("users_user"))
            .unwrap();

        let err = history.migrate("users", None, &mut engine).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::OperationRun { ref node, ref operation, .. }
                if node == "users.0001_initial" && operation == "CreateModel"
        ));
        assert!(!engine.in_transaction());
        assert!(engine.ledger().unwrap().is_empty());
        assert_eq!(history.app("users").unwrap().last_applied(), 0);
    }

    #[test]
    fn test_unknown_app() {
        let mut history = users_history();
        assert!(matches!(
            history.migrate("orders", None, &mut engine()),
            Err(MigrationError::AppNotFound { .. })
        ));
    }
}
