//! Build matrix loading
//!
//! The matrix is a YAML file of the form:
//!
//! ```yaml
//! configs:
//!   - name: debug-sanitizers
//!     config: -DCMAKE_BUILD_TYPE=Debug -DENABLE_ASAN=ON
//!   - name: debug
//!     config: -DCMAKE_BUILD_TYPE=Debug
//! ```

use crate::error::{MatrixError, MatrixResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// One named set of CMake flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Configuration name, used for the result directory
    pub name: String,

    /// Flags passed verbatim to the configure step
    #[serde(rename = "config", default)]
    pub flags: String,
}

impl BuildConfig {
    pub fn new(name: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: flags.into(),
        }
    }

    /// Result subdirectory name for this configuration
    pub fn dir_name(&self) -> String {
        format!("config-{}", self.name)
    }
}

/// Ordered list of configurations to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMatrix {
    pub configs: Vec<BuildConfig>,
}

impl BuildMatrix {
    /// Load and validate a matrix file
    pub async fn load(path: &Path) -> MatrixResult<Self> {
        if !path.exists() {
            return Err(MatrixError::MatrixNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| MatrixError::io(format!("reading build matrix {}", path.display()), e))?;

        Self::parse(&content).map_err(|reason| MatrixError::MatrixInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse and validate matrix YAML
    pub fn parse(content: &str) -> Result<Self, String> {
        let matrix: Self = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        matrix.validate()?;
        Ok(matrix)
    }

    fn validate(&self) -> Result<(), String> {
        if self.configs.is_empty() {
            return Err("no configurations listed under `configs`".to_string());
        }

        let mut seen = HashSet::new();
        for config in &self.configs {
            if config.name.is_empty() {
                return Err("configuration with an empty name".to_string());
            }
            if !is_valid_name(&config.name) {
                return Err(format!(
                    "configuration name '{}' may only contain letters, digits, '.', '_' and '-'",
                    config.name
                ));
            }
            if !seen.insert(config.name.as_str()) {
                return Err(format!("duplicate configuration name '{}'", config.name));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
