//! Configuration schema for plygate
//!
//! Configuration is stored at `~/.config/plygate/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP listener settings
    pub server: ServerConfig,

    /// Upload validation settings
    pub upload: UploadConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// External generator settings
    pub generator: GeneratorConfig,

    /// Model checkpoint provisioning
    pub model: ModelConfig,

    /// Object storage settings
    pub oss: OssConfig,

    /// Task ledger settings
    pub ledger: LedgerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,

    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:6008".to_string(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accepted image extensions, lowercase with leading dot
    pub allowed_extensions: Vec<String>,

    /// Largest accepted upload body
    pub max_upload_bytes: u64,

    /// Where uploaded images are kept while a request runs
    pub dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![
                ".jpg".to_string(),
                ".jpeg".to_string(),
                ".png".to_string(),
                ".webp".to_string(),
            ],
            max_upload_bytes: 10 * 1024 * 1024,
            dir: None,
        }
    }
}

impl UploadConfig {
    /// Whether an extension (with or without leading dot) is accepted
    pub fn is_allowed(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    /// Comma-separated list for error messages
    pub fn allowed_display(&self) -> String {
        self.allowed_extensions.join(", ")
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding `<fingerprint>.ply` artifacts
    pub dir: Option<PathBuf>,

    /// Artifacts older than N days are regenerated
    pub retention_days: u32,

    /// Seconds between background sweeps (0 = startup sweep only)
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_days: 7,
            sweep_interval_secs: 0,
        }
    }
}

impl CacheConfig {
    /// Retention window as a duration
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 86_400)
    }
}

/// External generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generator executable
    pub program: String,

    /// Kill the generator after N seconds (0 = no limit)
    pub timeout_secs: u64,

    /// Maximum generator processes running at once
    pub max_concurrent: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: "sharp".to_string(),
            timeout_secs: 600,
            max_concurrent: 1,
        }
    }
}

impl GeneratorConfig {
    /// Per-invocation timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Model checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Where to download the checkpoint from when missing
    pub checkpoint_url: String,

    /// Local checkpoint path
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint_url: "https://ml-site.cdn-apple.com/models/sharp/sharp_2572gikvuh.pt"
                .to_string(),
            checkpoint_path: None,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OssConfig {
    /// Endpoint host, e.g. `oss-cn-hangzhou.aliyuncs.com`
    pub endpoint: Option<String>,

    /// Bucket name
    pub bucket: Option<String>,

    /// Access key ID (or `OSS_ACCESS_KEY_ID`)
    pub access_key_id: Option<String>,

    /// Access key secret (or `OSS_ACCESS_KEY_SECRET`)
    pub access_key_secret: Option<String>,

    /// Download directory
    pub temp_dir: Option<PathBuf>,

    /// Attempts per download before giving up
    pub max_attempts: u32,

    /// Delay between attempts
    pub retry_delay_ms: u64,
}

impl Default for OssConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: None,
            access_key_id: None,
            access_key_secret: None,
            temp_dir: None,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Task ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Forget task records after N seconds
    pub ttl_secs: u64,

    /// Hard cap on remembered tasks
    pub max_entries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            max_entries: 10_000,
        }
    }
}
