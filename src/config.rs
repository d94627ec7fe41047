use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the configuration file expected at the project root.
pub const CONFIG_FILE: &str = "devloop.toml";

/// Configuration loaded from `devloop.toml` at the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct DevConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub dev: DevSection,

    /// Project root the relative paths above resolve against. Filled in by [`DevConfig::load`].
    #[serde(skip)]
    pub root: PathBuf,
}

/// Source, asset and artifact locations, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Application tree: routes live here as `index.py` / `index.html`.
    pub app: PathBuf,
    /// Static assets tree, watched by its own pipeline.
    pub assets: PathBuf,
    /// Root of the component metadata walk.
    pub components: PathBuf,
    /// Directory receiving the generated JSON artifacts.
    pub artifacts: PathBuf,
    /// Glob patterns excluded from the component walk.
    pub exclude: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            app: PathBuf::from("src/app"),
            assets: PathBuf::from("public"),
            components: PathBuf::from("src"),
            artifacts: PathBuf::from("settings"),
            exclude: Vec::new(),
        }
    }
}

/// How to launch the backend process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Entry-point argv, e.g. `["python", "main.py"]`. Required.
    pub command: Vec<String>,
    /// First port tried when allocating the backend port.
    pub port: u16,
    /// Environment variable carrying the allocated port into the backend.
    pub port_env: String,
    pub release_timeout_ms: u64,
    pub ready_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            port: 5091,
            port_env: "PORT".to_string(),
            release_timeout_ms: 5_000,
            ready_timeout_ms: 10_000,
        }
    }
}

/// Dev-loop behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevSection {
    /// First port tried when allocating the dev (proxy) port.
    pub port: u16,
    /// Quiescence window for both pipelines.
    pub debounce_ms: u64,
    /// Decorator names that mark a function as a UI component.
    pub component_decorators: Vec<String>,
    /// Optional command run by the assets pipeline before signalling reload.
    pub assets_command: Option<Vec<String>>,
}

impl Default for DevSection {
    fn default() -> Self {
        Self {
            port: 3000,
            debounce_ms: 350,
            component_decorators: vec!["component".to_string()],
            assets_command: None,
        }
    }
}

impl DevConfig {
    /// Load configuration from `devloop.toml` in the given root directory.
    ///
    /// Unlike most optional settings files, this one is required: a missing file
    /// or an empty `backend.command` is a [`ConfigError::Missing`].
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Err(ConfigError::Missing {
                what: CONFIG_FILE.to_string(),
                path: root.to_path_buf(),
            });
        }

        let contents =
            std::fs::read_to_string(&config_path).map_err(|err| ConfigError::Invalid {
                path: config_path.clone(),
                reason: err.to_string(),
            })?;

        Self::from_toml(root, &contents).map_err(|err| match err {
            ConfigError::Invalid { reason, .. } => ConfigError::Invalid {
                path: config_path.clone(),
                reason,
            },
            ConfigError::Missing { what, .. } => ConfigError::Missing {
                what,
                path: config_path.clone(),
            },
        })
    }

    /// Parse configuration text, resolving paths against `root`.
    pub fn from_toml(root: &Path, contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents).map_err(|err| ConfigError::Invalid {
            path: root.join(CONFIG_FILE),
            reason: err.to_string(),
        })?;

        if config.backend.command.is_empty() {
            return Err(ConfigError::Missing {
                what: "backend.command".to_string(),
                path: root.join(CONFIG_FILE),
            });
        }

        config.root = root.to_path_buf();
        Ok(config)
    }

    pub fn app_root(&self) -> PathBuf {
        self.root.join(&self.paths.app)
    }

    pub fn assets_root(&self) -> PathBuf {
        self.root.join(&self.paths.assets)
    }

    pub fn components_root(&self) -> PathBuf {
        self.root.join(&self.paths.components)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(&self.paths.artifacts)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.dev.debounce_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.release_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.ready_timeout_ms)
    }
}
