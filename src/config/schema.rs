//! Settings schema for cmake-matrix
//!
//! Settings are stored at `~/.config/cmake-matrix/config.toml`. Every field
//! has a default, so an absent file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Base image settings
    pub image: ImageSettings,

    /// Container layout settings
    pub container: ContainerSettings,

    /// Compiler cache settings
    pub cache: CacheSettings,

    /// Stage command templates
    pub commands: CommandSettings,
}

/// Base image used for every configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageSettings {
    /// Image repository name
    pub name: String,

    /// Image version, used as the tag
    pub version: String,

    /// Directory holding the Dockerfile used when the image is absent
    pub context_dir: PathBuf,
}

impl ImageSettings {
    /// Full image reference (`name:version`)
    pub fn tag(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            name: "shogun-memory-test".to_string(),
            version: "0.1".to_string(),
            context_dir: PathBuf::from("."),
        }
    }
}

/// Paths and mounts inside the container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContainerSettings {
    /// Where the project source is bind-mounted
    pub source_dir: String,

    /// Build directory (host bind or tmpfs)
    pub build_dir: String,

    /// Command that keeps the container alive between execs
    pub keep_alive: Vec<String>,

    /// Options for the tmpfs build mount
    pub tmpfs_options: String,

    /// Shell used to run stage commands
    pub shell: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            source_dir: "/opt/shogun".to_string(),
            build_dir: "/opt/build".to_string(),
            keep_alive: vec!["sleep".to_string(), "infinity".to_string()],
            tmpfs_options: "exec".to_string(),
            shell: "bash".to_string(),
        }
    }
}

/// Compiler cache volume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// Name of the persistent volume
    pub volume: String,

    /// Mount point inside the container
    pub mount_path: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            volume: "cmake-matrix-ccache".to_string(),
            mount_path: "/root/.ccache".to_string(),
        }
    }
}

/// Stage command templates.
///
/// Placeholders: `{source_dir}`, `{build_dir}`, `{jobs}`, `{flags}`,
/// `{test_filter}`, `{uid}`, `{gid}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    pub setup: String,
    pub configure: String,
    pub compile: String,
    pub check: String,
    pub cleanup: String,

    /// Parallel jobs for the compile step
    pub jobs: u32,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            setup: "mkdir -p {build_dir}".to_string(),
            configure: "cd {build_dir}; cmake -DCMAKE_INSTALL_PREFIX=$HOME/shogun-build \
                        -DENABLE_TESTING=ON {flags} {source_dir}"
                .to_string(),
            compile: "cd {build_dir}; make -j{jobs}".to_string(),
            check: "cd {build_dir}; valgrind --leak-check=full bin/shogun-unit-test {test_filter}"
                .to_string(),
            cleanup: "chown -R {uid}:{gid} {build_dir}".to_string(),
            jobs: 4,
        }
    }
}
