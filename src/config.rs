//! Client configuration.
//!
//! Read from TOML, then overridden from the environment:
//!
//! | variable                          | field                  |
//! |-----------------------------------|------------------------|
//! | `TASKBOARD_BACKEND`               | `backend`              |
//! | `TASKBOARD_DATA_DIR`              | `data_dir`             |
//! | `TASKBOARD_DEFAULT_COLUMN_COLOR`  | `default_column_color` |

use crate::{
    domain::{validate_color, DEFAULT_COLUMN_COLOR},
    error::{Result, TaskboardError},
    gateway::{Gateway, MemoryGateway},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info};

pub const ENV_BACKEND: &str = "TASKBOARD_BACKEND";
pub const ENV_DATA_DIR: &str = "TASKBOARD_DATA_DIR";
pub const ENV_DEFAULT_COLUMN_COLOR: &str = "TASKBOARD_DEFAULT_COLUMN_COLOR";

/// Which gateway implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    File,
}

impl FromStr for Backend {
    type Err = TaskboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(TaskboardError::ConfigError(format!(
                "unknown backend '{}', expected 'memory' or 'file'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Directory holding the table files; required by the file backend
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// New-column color when the board has no settings row; see [`crate::App::with_config`]
    #[serde(default = "default_column_color")]
    pub default_column_color: String,
}

fn default_column_color() -> String {
    DEFAULT_COLUMN_COLOR.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: None,
            default_column_color: default_column_color(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        debug!(path = %path.as_ref().display(), "read config file");
        Self::from_toml(&content)
    }

    /// Defaults overridden from the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`; blank values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(color) = lookup(ENV_DEFAULT_COLUMN_COLOR) {
            self.default_column_color = color;
        }
        Ok(self)
    }

    /// Checks that the configured backend has what it needs
    pub fn validate(&self) -> Result<()> {
        validate_color(&self.default_column_color)?;
        if self.backend == Backend::File && self.data_dir.is_none() {
            return Err(TaskboardError::ConfigError(format!(
                "file backend requires a data directory (set data_dir or {})",
                ENV_DATA_DIR
            )));
        }
        Ok(())
    }

    /// Opens the configured gateway
    pub async fn open_gateway(&self) -> Result<Arc<dyn Gateway>> {
        self.validate()?;
        match self.backend {
            Backend::Memory => {
                info!("using in-memory gateway");
                Ok(Arc::new(MemoryGateway::new()))
            }
            Backend::File => self.open_file_gateway().await,
        }
    }

    #[cfg(feature = "file-gateway")]
    async fn open_file_gateway(&self) -> Result<Arc<dyn Gateway>> {
        let dir = self.data_dir.as_ref().ok_or_else(|| {
            TaskboardError::ConfigError("file backend requires a data directory".to_string())
        })?;
        let gateway = crate::gateway::FileGateway::open(dir).await?;
        Ok(Arc::new(gateway))
    }

    #[cfg(not(feature = "file-gateway"))]
    async fn open_file_gateway(&self) -> Result<Arc<dyn Gateway>> {
        Err(TaskboardError::ConfigError(
            "built without the file-gateway feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.default_column_color, "#e2e8f0");
    }

    #[test]
    fn test_parse_toml() {
        let config = ClientConfig::from_toml(
            r##"
backend = "file"
data_dir = "/tmp/board"
default_column_color = "#112233"
"##,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/board")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        assert!(matches!(
            ClientConfig::from_toml("backend = [1, 2"),
            Err(TaskboardError::ConfigParse(_))
        ));
        assert!(ClientConfig::from_toml("backend = \"cloud\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::default()
            .with_overrides(env(&[
                (ENV_BACKEND, "FILE"),
                (ENV_DATA_DIR, "/var/board"),
                (ENV_DEFAULT_COLUMN_COLOR, "  "),
            ]))
            .unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/board")));
        assert_eq!(config.default_column_color, DEFAULT_COLUMN_COLOR);

        assert!(ClientConfig::default()
            .with_overrides(env(&[(ENV_BACKEND, "cloud")]))
            .is_err());
    }

    #[test]
    fn test_file_backend_requires_data_dir() {
        let config = ClientConfig {
            backend: Backend::File,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TaskboardError::ConfigError(_))
        ));

        let config = ClientConfig {
            default_column_color: "blue".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TaskboardError::InvalidColor(_))
        ));
    }

    #[tokio::test]
    async fn test_open_gateway() {
        let memory = ClientConfig::default().open_gateway().await.unwrap();
        assert_eq!(memory.subscriber_count(), 0);

        let temp_dir = TempDir::new().unwrap();
        let config = ClientConfig {
            backend: Backend::File,
            data_dir: Some(temp_dir.path().join("board")),
            ..ClientConfig::default()
        };
        config.open_gateway().await.unwrap();
        assert!(temp_dir.path().join("board").exists());
    }

    #[tokio::test]
    async fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("taskboard.toml");
        tokio::fs::write(&path, "backend = \"memory\"\n").await.unwrap();

        let config = ClientConfig::from_file(&path).await.unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert!(ClientConfig::from_file(temp_dir.path().join("missing.toml"))
            .await
            .is_err());
    }
}
