//! Container shared types
//!
//! Contains data structures used by container runtimes.
//! The actual engine invocation logic is in the runtime implementations.

use std::collections::HashMap;
use std::path::PathBuf;

/// Source side of a mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// Host directory bind
    Host(PathBuf),
    /// Named engine volume
    Volume(String),
}

/// A bind or volume mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: MountSource,
    /// Mount path inside the container
    pub target: String,
}

impl Mount {
    pub fn host(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Host(source.into()),
            target: target.into(),
        }
    }

    pub fn volume(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: MountSource::Volume(name.into()),
            target: target.into(),
        }
    }

    /// Generate the `-v` argument for the engine CLI
    pub fn volume_arg(&self) -> String {
        let source = match &self.source {
            MountSource::Host(path) => path.display().to_string(),
            MountSource::Volume(name) => name.clone(),
        };
        format!("{}:{}", source, self.target)
    }
}

/// In-memory filesystem mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmpfsMount {
    pub target: String,
    /// Mount options, e.g. `exec,size=8g` (empty for engine defaults)
    pub options: String,
}

impl TmpfsMount {
    /// Generate the `--tmpfs` argument for the engine CLI
    pub fn tmpfs_arg(&self) -> String {
        if self.options.is_empty() {
            self.target.clone()
        } else {
            format!("{}:{}", self.target, self.options)
        }
    }
}

/// Container configuration for creating a new container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique on the engine
    pub name: String,
    /// Image reference
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Bind and volume mounts
    pub mounts: Vec<Mount>,
    /// tmpfs mounts
    pub tmpfs: Vec<TmpfsMount>,
    /// Long-running command that keeps the container up between execs
    pub command: Vec<String>,
}

/// Information about a named volume
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub mountpoint: Option<String>,
    pub created_at: Option<String>,
}

/// A locally available image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub tag: String,
    pub id: String,
}

impl ImageHandle {
    /// First 12 hex digits of the image id
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        &id[..12.min(id.len())]
    }
}
