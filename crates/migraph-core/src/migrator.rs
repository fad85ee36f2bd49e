//! Entry points: make, run, and make-and-run.
//!
//! Each call loads a fresh [`History`] from the node files, works on it,
//! and drops it before returning, so consecutive calls always see the
//! current model registry and files.

use crate::catalog::{ModelRegistry, Registry};
use crate::config::MigrationConfig;
use crate::engine::SchemaEngine;
use crate::migration::{AppState, History, MigrationError, NodeStatus, OperationRegistry, Result};
use tracing::info;

/// Options for [`Migrator::make`].
#[derive(Debug, Clone, Default)]
pub struct MakeOptions {
    /// Create one node with no operations instead of diffing.
    pub empty: bool,
    /// Keep the new node in memory only.
    pub omit_write: bool,
}

/// Options for [`Migrator::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only migrate this application. `None` migrates every application.
    pub app: Option<String>,
    /// Target node of `app`. `None` targets its last node.
    pub node: Option<String>,
    /// Update the ledger without running operations.
    pub fake: bool,
}

impl RunOptions {
    /// Migrate `app` to its last node.
    pub fn app(app: impl Into<String>) -> Self {
        Self {
            app: Some(app.into()),
            ..Default::default()
        }
    }

    /// Target a specific node.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Only update the ledger.
    pub fn with_fake(mut self, fake: bool) -> Self {
        self.fake = fake;
        self
    }
}

/// Makes and runs migrations for the applications of a model registry.
#[derive(Debug, Clone)]
pub struct Migrator<R: ModelRegistry = Registry> {
    registry: R,
    config: MigrationConfig,
    operations: OperationRegistry,
}

impl<R: ModelRegistry> Migrator<R> {
    /// Create a migrator with the built-in operations.
    pub fn new(registry: R, config: MigrationConfig) -> Self {
        Self {
            registry,
            config,
            operations: OperationRegistry::new(),
        }
    }

    /// Replace the operation registry.
    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.operations = operations;
        self
    }

    /// Operation registry, for registering external operations.
    pub fn operations_mut(&mut self) -> &mut OperationRegistry {
        &mut self.operations
    }

    /// The model registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Load and resolve every application's nodes.
    pub fn load_history(&self) -> Result<History> {
        History::load(&self.registry, &self.config, &self.operations)
    }

    /// Create the next node of `app` and, unless `omit_write` is set,
    /// write it to disk.
    ///
    /// Returns the application's state including the new node, if any.
    pub fn make(&self, app: &str, options: MakeOptions) -> Result<AppState> {
        let mut history = self.load_history()?;
        let created = if options.empty {
            Some(history.add_empty_node(app, &self.config)?)
        } else {
            history.make_migrations(app, &self.config)?
        };
        match created {
            Some(key) => {
                let node = history.node(key);
                info!(app, node = %node.id(), operations = node.operations.len(), "created migration");
            }
            None => info!(app, "no changes detected"),
        }
        if !options.omit_write {
            history.save_pending(app, &self.operations, &self.config)?;
        }
        history.into_app(app)
    }

    /// Apply (or reverse) migrations on `engine`.
    pub fn run(&self, engine: &mut dyn SchemaEngine, options: &RunOptions) -> Result<()> {
        if options.app.is_none() && options.node.is_some() {
            return Err(MigrationError::NodeWithoutApp);
        }
        let mut history = self.load_history()?;
        history.load_ledger(engine)?;

        let result = match &options.app {
            Some(app) => drive(&mut history, app, options.node.as_deref(), engine, options.fake),
            None => run_all(&mut history, engine, options.fake),
        };
        history.clear();
        result
    }

    /// Make and write migrations for every application, then apply them
    /// all on `engine`.
    pub fn make_and_run(&self, engine: &mut dyn SchemaEngine) -> Result<()> {
        let mut history = self.load_history()?;
        let apps: Vec<String> = history.apps().iter().map(|a| a.name().to_string()).collect();
        for app in &apps {
            if let Some(key) = history.make_migrations(app, &self.config)? {
                info!(app = %app, node = %history.node(key).id(), "created migration");
            }
            history.save_pending(app, &self.operations, &self.config)?;
        }

        history.load_ledger(engine)?;
        let result = run_all(&mut history, engine, false);
        history.clear();
        result
    }

    /// Every node with its applied flag according to `engine`'s ledger.
    pub fn status(&self, engine: &mut dyn SchemaEngine) -> Result<Vec<NodeStatus>> {
        let mut history = self.load_history()?;
        history.load_ledger(engine)?;
        Ok(history.status())
    }
}

fn drive(
    history: &mut History,
    app: &str,
    node: Option<&str>,
    engine: &mut dyn SchemaEngine,
    fake: bool,
) -> Result<()> {
    if fake {
        history.fake(app, node, engine)
    } else {
        history.migrate(app, node, engine)
    }
}

fn run_all(history: &mut History, engine: &mut dyn SchemaEngine, fake: bool) -> Result<()> {
    for app in apps_with_nodes(history) {
        drive(history, &app, None, engine, fake)?;
    }
    Ok(())
}

fn apps_with_nodes(history: &History) -> Vec<String> {
    history
        .apps()
        .iter()
        .filter(|a| !a.migrations().is_empty())
        .map(|a| a.name().to_string())
        .collect()
}
