//! Dependency resolution.
//!
//! A depth-first walk over declared dependencies. Each node is folded into
//! its application's state exactly once, after everything it depends on.
//! A node found `InProgress` while walking is on the current path, which
//! means the edge closes a cycle.

use super::error::{MigrationError, Result};
use super::history::{History, NodeKey};
use super::node::{parse_node_id, Dependency, Visit};

impl History {
    /// Resolve every node of every application.
    pub(crate) fn resolve_all(&mut self) -> Result<()> {
        for app in 0..self.apps.len() {
            for node in 0..self.apps[app].migrations.len() {
                self.resolve(NodeKey { app, node })?;
            }
        }
        Ok(())
    }

    /// Resolve one node and, first, its dependencies.
    pub(crate) fn resolve(&mut self, key: NodeKey) -> Result<()> {
        match self.node(key).visit {
            Visit::Done => return Ok(()),
            Visit::InProgress => {
                let label = self.node(key).label();
                return Err(MigrationError::CircularDependency {
                    node: label.clone(),
                    dependency: label,
                });
            }
            Visit::Unvisited => {}
        }

        self.node_mut(key).visit = Visit::InProgress;
        let result = self.resolve_in_progress(key);
        self.node_mut(key).visit = match &result {
            Ok(()) => Visit::Done,
            Err(_) => Visit::Unvisited,
        };
        result
    }

    fn resolve_in_progress(&mut self, key: NodeKey) -> Result<()> {
        let dependencies = self.node(key).dependencies.clone();
        let mut targets = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            let target = self.dependency_key(key, dependency)?;
            match self.node(target).visit {
                Visit::InProgress => {
                    return Err(MigrationError::CircularDependency {
                        node: self.node(key).label(),
                        dependency: self.node(target).label(),
                    })
                }
                Visit::Unvisited => self.resolve(target)?,
                Visit::Done => {}
            }
            targets.push(target);
        }

        let app = &mut self.apps[key.app];
        app.migrations[key.node].fold_into(&mut app.state)?;

        for target in targets {
            let dependents = self.dependents.entry(target).or_default();
            if !dependents.contains(&key) {
                dependents.push(key);
            }
        }
        Ok(())
    }

    /// Locate the node a dependency edge points at.
    pub(crate) fn dependency_key(&self, from: NodeKey, dependency: &Dependency) -> Result<NodeKey> {
        let invalid = |reason: &str| MigrationError::InvalidDependency {
            node: self.node(from).label(),
            dep_app: dependency.app.clone(),
            dep_node: dependency.node.clone(),
            reason: reason.to_string(),
        };

        let (number, name) =
            parse_node_id(&dependency.node).ok_or_else(|| invalid("malformed node identifier"))?;
        let app = self
            .position(&dependency.app)
            .map_err(|_| invalid("unknown app"))?;
        let node = (number as usize)
            .checked_sub(1)
            .filter(|&i| i < self.apps[app].migrations.len())
            .ok_or_else(|| invalid("node number out of range"))?;
        if self.apps[app].migrations[node].name != name {
            return Err(invalid("node name mismatch"));
        }
        Ok(NodeKey { app, node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Application, FieldDef, FieldType, ScalarType};
    use crate::migration::node::Node;
    use crate::migration::operation::{AddFields, CreateModel};
    use crate::migration::state::AppState;

    fn app(name: &str, nodes: Vec<Node>) -> AppState {
        let mut state = AppState::new(Application::new(name), "unused");
        state.migrations = nodes;
        state
    }

    fn history(apps: Vec<AppState>) -> History {
        let mut history = History::new();
        for app in apps {
            history.insert(app);
        }
        history
    }

    #[test]
    fn test_dependencies_fold_first() {
        let email = FieldDef::new("email", FieldType::scalar(ScalarType::string()));
        let mut history = history(vec![
            app(
                "blog",
                vec![Node::new("blog", 1, "initial")
                    .with_operation(CreateModel::new("Post", vec![]))
                    .with_dependency("users", "0002_email")],
            ),
            app(
                "users",
                vec![
                    Node::new("users", 1, "initial")
                        .with_operation(CreateModel::new("User", vec![FieldDef::primary_key("id")])),
                    Node::new("users", 2, "email")
                        .with_operation(AddFields::new("User", vec![email]))
                        .with_dependency("users", "0001_initial"),
                ],
            ),
        ]);

        history.resolve_all().unwrap();
        assert!(history.apps().iter().all(|a| a.migrations().iter().all(|n| n.is_processed())));
        assert_eq!(
            history.app("users").unwrap().state().model("User").unwrap().fields.len(),
            2
        );

        let users_second = NodeKey { app: 1, node: 1 };
        assert_eq!(history.dependents(users_second), &[NodeKey { app: 0, node: 0 }]);
        assert_eq!(
            history.dependents(NodeKey { app: 1, node: 0 }),
            &[users_second]
        );
    }

    #[test]
    fn test_cycle_is_reported_before_any_fold() {
        let mut history = history(vec![
            app(
                "a",
                vec![Node::new("a", 1, "initial")
                    .with_operation(CreateModel::new("A", vec![]))
                    .with_dependency("b", "0001_initial")],
            ),
            app(
                "b",
                vec![Node::new("b", 1, "initial")
                    .with_operation(CreateModel::new("B", vec![]))
                    .with_dependency("a", "0001_initial")],
            ),
        ]);

        let err = history.resolve_all().unwrap_err();
        assert!(matches!(
            err,
            MigrationError::CircularDependency { ref node, ref dependency }
                if node == "b.0001_initial" && dependency == "a.0001_initial"
        ));
        assert!(history.apps().iter().all(|a| a.models().is_empty()));
        assert!(history
            .apps()
            .iter()
            .all(|a| a.migrations().iter().all(|n| !n.is_processed())));
    }

    #[test]
    fn test_transitive_cycle_across_three_apps() {
        let node = |name: &str, model: &str, dep: &str| {
            Node::new(name, 1, "initial")
                .with_operation(CreateModel::new(model, vec![]))
                .with_dependency(dep, "0001_initial")
        };
        let mut history = history(vec![
            app("a", vec![node("a", "A", "b")]),
            app("b", vec![node("b", "B", "c")]),
            app("c", vec![node("c", "C", "a")]),
        ]);

        let err = history.resolve_all().unwrap_err();
        assert!(matches!(
            err,
            MigrationError::CircularDependency { ref node, ref dependency }
                if node == "c.0001_initial" && dependency == "a.0001_initial"
        ));
        assert!(history.apps().iter().all(|a| a.models().is_empty()));
        assert!(history
            .apps()
            .iter()
            .all(|a| a.migrations().iter().all(|n| !n.is_processed())));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut history = history(vec![app(
            "a",
            vec![Node::new("a", 1, "initial").with_dependency("a", "0001_initial")],
        )]);
        assert!(matches!(
            history.resolve_all(),
            Err(MigrationError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_invalid_dependencies() {
        let cases = [
            ("users", "initial", "malformed"),
            ("orders", "0001_initial", "unknown app"),
            ("users", "0002_more", "out of range"),
            ("users", "0001_other", "mismatch"),
        ];
        for (dep_app, dep_node, reason_part) in cases {
            let mut history = history(vec![
                app("users", vec![Node::new("users", 1, "initial")]),
                app(
                    "blog",
                    vec![Node::new("blog", 1, "initial").with_dependency(dep_app, dep_node)],
                ),
            ]);
            match history.resolve_all() {
                Err(MigrationError::InvalidDependency { node, reason, .. }) => {
                    assert_eq!(node, "blog.0001_initial");
                    assert!(reason.contains(reason_part), "{reason}");
                }
                other => panic!("expected invalid dependency, got {other:?}"),
            }
        }
    }
}
