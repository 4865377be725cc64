//! Configuration management for plygate

pub mod schema;

pub use schema::Config;

use crate::error::{PlygateError, PlygateResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the staging directory kept inside the cache root
pub const STAGING_DIR_NAME: &str = ".staging";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plygate")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plygate")
    }

    /// Load configuration, falling back to defaults if not exists
    pub async fn load(&self) -> PlygateResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PlygateResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PlygateError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| PlygateError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PlygateResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PlygateError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PlygateResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PlygateError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure every directory the service writes to exists
    pub async fn ensure_state_dirs(config: &Config) -> PlygateResult<()> {
        let dirs = [
            config.cache_dir(),
            config.staging_dir(),
            config.upload_dir(),
            config.oss_temp_dir(),
        ];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                PlygateError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        if let Some(parent) = config.checkpoint_path().parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                PlygateError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill object storage credentials from the environment when the file
/// leaves them unset
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if config.oss.access_key_id.is_none() {
        config.oss.access_key_id = var("OSS_ACCESS_KEY_ID");
    }
    if config.oss.access_key_secret.is_none() {
        config.oss.access_key_secret = var("OSS_ACCESS_KEY_SECRET");
    }
    if config.oss.endpoint.is_none() {
        config.oss.endpoint = var("OSS_ENDPOINT");
    }
    if config.oss.bucket.is_none() {
        config.oss.bucket = var("OSS_BUCKET");
    }
}

impl Config {
    /// Artifact store root
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("cache"))
    }

    /// Private staging area, on the same filesystem as the cache root so
    /// publication is a rename
    pub fn staging_dir(&self) -> PathBuf {
        self.cache_dir().join(STAGING_DIR_NAME)
    }

    /// Upload directory
    pub fn upload_dir(&self) -> PathBuf {
        self.upload
            .dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("uploads"))
    }

    /// Remote download directory
    pub fn oss_temp_dir(&self) -> PathBuf {
        self.oss
            .temp_dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("oss"))
    }

    /// Model checkpoint location
    pub fn checkpoint_path(&self) -> PathBuf {
        self.model.checkpoint_path.clone().unwrap_or_else(|| {
            let name = self
                .model
                .checkpoint_url
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .unwrap_or("model.pt");
            ConfigManager::state_dir().join("models").join(name)
        })
    }
}
