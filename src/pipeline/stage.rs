//! Pipeline stages and their reports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// File holding the flag string of a configuration
pub const FLAGS_FILE: &str = "cmake_config.txt";

/// One step of a configuration's pipeline, declared in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Configure,
    Compile,
    MemCheck,
    Cleanup,
    Teardown,
}

impl Stage {
    /// Stages whose output is captured into a result file
    pub const LOGGED: [Stage; 3] = [Stage::Configure, Stage::Compile, Stage::MemCheck];

    /// Result file for the stage's combined output
    pub fn log_file(&self) -> Option<&'static str> {
        match self {
            Stage::Configure => Some("cmake_output.txt"),
            Stage::Compile => Some("build_output.txt"),
            Stage::MemCheck => Some("valgrind_output.txt"),
            Stage::Setup | Stage::Cleanup | Stage::Teardown => None,
        }
    }

    /// Progress label
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Configure => "cmake",
            Stage::Compile => "build",
            Stage::MemCheck => "valgrind",
            Stage::Cleanup => "cleanup",
            Stage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one stage command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Exit code of the command; non-zero does not stop the pipeline
    pub exit_code: i32,
    /// Bytes captured
    pub bytes: u64,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a whole configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationReport {
    pub name: String,
    pub flags: String,
    pub result_dir: std::path::PathBuf,
    pub stages: Vec<StageReport>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl ConfigurationReport {
    /// Stages that exited non-zero
    pub fn failed_stages(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| !s.succeeded())
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
