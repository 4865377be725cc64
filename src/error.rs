//! Error types for plygate
//!
//! All modules use `PlygateResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for plygate operations
pub type PlygateResult<T> = Result<T, PlygateError>;

/// All errors that can occur in plygate
#[derive(Error, Debug)]
pub enum PlygateError {
    // Validation errors
    #[error("Invalid file type {ext}. Allowed: {allowed}")]
    UnsupportedExtension { ext: String, allowed: String },

    #[error("{0}")]
    Validation(String),

    #[error("Upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: u64 },

    // Remote fetch errors
    #[error("Remote object not found: {0}")]
    RemoteNotFound(String),

    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    // Generation errors
    #[error("Failed to generate PLY: {0}")]
    Generation(String),

    #[error("Generator timed out after {secs}s")]
    GenerationTimeout { secs: u64 },

    #[error("Expected PLY file not found: {0}")]
    GenerationOutputMissing(PathBuf),

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Normalizer errors
    #[error("PLY header in {path} has no end_header within {lines} lines")]
    HeaderUnterminated { path: PathBuf, lines: usize },

    // Lookup errors
    #[error("PLY file not found: {0}")]
    ArtifactNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file already exists: {0}")]
    ConfigExists(PathBuf),

    // Provisioning errors
    #[error("Model bootstrap failed: {0}")]
    Bootstrap(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlygateError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Copy of this error for every caller that shared one failed operation
    ///
    /// The variant and its fields are kept. I/O sources keep their kind and
    /// message; serialization errors become `Internal` with their text.
    pub fn duplicate(&self) -> Self {
        let io_copy = |e: &std::io::Error| std::io::Error::new(e.kind(), e.to_string());
        match self {
            Self::UnsupportedExtension { ext, allowed } => Self::UnsupportedExtension {
                ext: ext.clone(),
                allowed: allowed.clone(),
            },
            Self::Validation(msg) => Self::Validation(msg.clone()),
            Self::UploadTooLarge { limit } => Self::UploadTooLarge { limit: *limit },
            Self::RemoteNotFound(url) => Self::RemoteNotFound(url.clone()),
            Self::Download { url, reason } => Self::download(url.clone(), reason.clone()),
            Self::Generation(msg) => Self::Generation(msg.clone()),
            Self::GenerationTimeout { secs } => Self::GenerationTimeout { secs: *secs },
            Self::GenerationOutputMissing(path) => Self::GenerationOutputMissing(path.clone()),
            Self::CommandFailed { command, source } => {
                Self::command_failed(command.clone(), io_copy(source))
            }
            Self::HeaderUnterminated { path, lines } => Self::HeaderUnterminated {
                path: path.clone(),
                lines: *lines,
            },
            Self::ArtifactNotFound(name) => Self::ArtifactNotFound(name.clone()),
            Self::TaskNotFound(id) => Self::TaskNotFound(id.clone()),
            Self::ConfigInvalid { path, reason } => Self::ConfigInvalid {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigNotFound(path) => Self::ConfigNotFound(path.clone()),
            Self::ConfigDirCreate { path, source } => Self::ConfigDirCreate {
                path: path.clone(),
                source: io_copy(source),
            },
            Self::ConfigExists(path) => Self::ConfigExists(path.clone()),
            Self::Bootstrap(msg) => Self::Bootstrap(msg.clone()),
            Self::Io { context, source } => Self::io(context.clone(), io_copy(source)),
            Self::Json(e) => Self::Internal(e.to_string()),
            Self::TomlParse(e) => Self::Internal(e.to_string()),
            Self::TomlSerialize(e) => Self::Internal(e.to_string()),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }

    /// Check if error is retryable
    ///
    /// A failed generation leaves the fingerprint uncached, so the same
    /// request can simply be submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation(_)
                | Self::GenerationTimeout { .. }
                | Self::GenerationOutputMissing(_)
                | Self::Download { .. }
        )
    }

    /// Whether the caller is at fault (maps to a 4xx response)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedExtension { .. }
                | Self::Validation(_)
                | Self::UploadTooLarge { .. }
                | Self::RemoteNotFound(_)
                | Self::Download { .. }
                | Self::ArtifactNotFound(_)
                | Self::TaskNotFound(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Bootstrap(_) => Some(
                "Download the model checkpoint manually and set model.checkpoint_path",
            ),
            Self::CommandFailed { .. } => {
                Some("Check that generator.program is installed and on PATH")
            }
            Self::ConfigExists(_) => Some("Pass --force to overwrite"),
            Self::GenerationTimeout { .. } => Some("Raise generator.timeout_secs"),
            _ => None,
        }
    }
}
