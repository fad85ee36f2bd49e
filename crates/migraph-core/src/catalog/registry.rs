//! Model registry: the live model definitions of every application.

use super::model::ModelDef;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// An application and the live definitions of its models.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    /// Application name.
    pub name: String,
    /// Directory holding this application's node files. `None` means
    /// `<migrations_dir>/<name>`.
    pub path: Option<PathBuf>,
    /// Live model definitions keyed by model name.
    pub models: BTreeMap<String, ModelDef>,
}

impl Application {
    /// Create an application with no models.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            models: BTreeMap::new(),
        }
    }

    /// Set the node directory for this application.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a model, filling in its default table name.
    pub fn with_model(mut self, mut model: ModelDef) -> Self {
        model.resolve_table(&self.name);
        self.models.insert(model.name.clone(), model);
        self
    }

    /// Get a model by name.
    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }
}

/// Source of live model definitions.
///
/// Implementations hand out snapshots; the migration engine never writes back.
pub trait ModelRegistry {
    /// All registered applications, in a stable order.
    fn applications(&self) -> Vec<Application>;

    /// Look up one application by name.
    fn application(&self, name: &str) -> Option<Application> {
        self.applications().into_iter().find(|a| a.name == name)
    }
}

/// In-memory model registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    apps: Vec<Application>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application, replacing any previous one with the same name.
    pub fn register(&mut self, app: Application) {
        match self.apps.iter_mut().find(|a| a.name == app.name) {
            Some(existing) => *existing = app,
            None => self.apps.push(app),
        }
    }

    /// Builder form of [`Registry::register`].
    pub fn with_app(mut self, app: Application) -> Self {
        self.register(app);
        self
    }

    /// Mutable access to a registered application.
    pub fn app_mut(&mut self, name: &str) -> Option<&mut Application> {
        self.apps.iter_mut().find(|a| a.name == name)
    }
}

impl ModelRegistry for Registry {
    fn applications(&self) -> Vec<Application> {
        self.apps.clone()
    }

    fn application(&self, name: &str) -> Option<Application> {
        self.apps.iter().find(|a| a.name == name).cloned()
    }
}
