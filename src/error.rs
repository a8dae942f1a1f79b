//! Error types for cmake-matrix
//!
//! All modules use `MatrixResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cmake-matrix operations
pub type MatrixResult<T> = Result<T, MatrixError>;

/// All errors that can occur while running a build matrix
#[derive(Error, Debug)]
pub enum MatrixError {
    // Environment errors
    #[error("Container engine not found: {0}")]
    RuntimeNotFound(String),

    #[error("Container engine is not responding: {0}")]
    RuntimeUnavailable(String),

    // Configuration errors
    #[error("Invalid settings at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Build matrix file not found: {0}")]
    MatrixNotFound(PathBuf),

    #[error("Invalid build matrix at {path}: {reason}")]
    MatrixInvalid { path: PathBuf, reason: String },

    // Image errors
    #[error("Image build failed: {tag}: {reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("Image not found after build: {0}")]
    ImageMissing(String),

    // Container errors
    #[error("A container named {0} already exists")]
    ContainerNameConflict(String),

    #[error("Kept existing container {0}; refusing to replace it")]
    ContainerConflictDeclined(String),

    #[error("Invalid answer '{answer}' for replacing container {name}")]
    ContainerConflictInvalidAnswer { name: String, answer: String },

    #[error("Container creation failed: {name}: {reason}")]
    ContainerCreate { name: String, reason: String },

    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    #[error("Container setup failed in {name}, exit code: {code}")]
    ContainerSetup { name: String, code: i32 },

    // Cache errors
    #[error("Failed to create cache volume {name}: {reason}")]
    CacheVolumeCreate { name: String, reason: String },

    // Result errors
    #[error("Result directory already exists: {0}")]
    ResultDirExists(PathBuf),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("Interrupted")]
    Interrupted,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatrixError {
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

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the failure left a container that belongs to somebody else.
    ///
    /// The top-level guard must not remove the named container in this case.
    pub fn leaves_foreign_container(&self) -> bool {
        matches!(
            self,
            Self::ContainerConflictDeclined(_) | Self::ContainerConflictInvalidAnswer { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound(_) => Some("Install Docker or Podman, or pass --runtime"),
            Self::RuntimeUnavailable(_) => Some("Start the container engine daemon and retry"),
            Self::ContainerConflictDeclined(_) | Self::ContainerConflictInvalidAnswer { .. } => {
                Some("Pass --container with another name, or --yes to replace it")
            }
            Self::MatrixNotFound(_) => Some("Pass the path to a YAML file with a `configs` list"),
            Self::Interrupted => Some("Check the result directory for partial logs"),
            Self::ResultDirExists(_) => Some("Pass another --result-path, or move the old results away"),
            _ => None,
        }
    }
}
