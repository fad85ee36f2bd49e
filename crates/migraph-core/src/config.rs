//! Migration and engine configuration.

use std::path::{Path, PathBuf};

/// Default root directory for node files.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default chrono format for automatically named nodes.
pub const DEFAULT_AUTO_NAME_FORMAT: &str = "auto_%Y%m%d_%H%M%S";

/// Configuration for making and running migrations.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Root directory; each application's nodes live in `<root>/<app>`
    /// unless the application sets its own path.
    pub migrations_dir: PathBuf,

    /// Write node files with indentation.
    pub pretty: bool,

    /// chrono format string for names of nodes after the first.
    /// The output must be ASCII letters, digits and underscores.
    pub auto_name_format: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            pretty: true,
            auto_name_format: DEFAULT_AUTO_NAME_FORMAT.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Create a configuration rooted at `migrations_dir`.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Default::default()
        }
    }

    /// Set whether node files are pretty-printed.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set the format used for automatic node names.
    pub fn with_auto_name_format(mut self, format: impl Into<String>) -> Self {
        self.auto_name_format = format.into();
        self
    }

    /// Node directory for `app` when it has no explicit path.
    pub fn app_dir(&self, app: &str) -> PathBuf {
        self.migrations_dir.join(app)
    }
}

/// Configuration for [`SledEngine`](crate::engine::SledEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identifier reported in errors and logs.
    pub name: String,

    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush on every write.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            path: PathBuf::from("./migraph_data"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(500),
            compression: true,
            temporary: false,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the database identifier.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        if let Some(ms) = self.flush_every_ms {
            config = config.flush_every_ms(Some(ms));
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_dir() {
        let config = MigrationConfig::new("/tmp/project/migrations");
        assert_eq!(
            config.app_dir("users"),
            PathBuf::from("/tmp/project/migrations/users")
        );
        assert!(config.pretty);
    }

    #[test]
    fn test_engine_config_builders() {
        let config = EngineConfig::temporary().with_name("test");
        assert!(config.temporary);
        assert_eq!(config.name, "test");
    }
}
