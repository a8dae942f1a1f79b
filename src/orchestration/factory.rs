//! Runtime factory for creating the configured container runtime

use crate::orchestration::cli_runtime::CliRuntime;
use crate::orchestration::runtime::ContainerRuntime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Supported container engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Docker CLI
    Docker,
    /// Podman CLI
    Podman,
}

impl Engine {
    /// Name of the engine binary
    pub fn binary(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }

    /// Get a human-readable engine name
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Docker => "Docker",
            Engine::Podman => "Podman",
        }
    }

    /// Pick the first installed engine, preferring Docker
    pub async fn detect() -> Self {
        for engine in [Engine::Docker, Engine::Podman] {
            if engine.installed().await {
                return engine;
            }
        }
        Engine::Docker
    }

    async fn installed(&self) -> bool {
        Command::new(self.binary())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Create a container runtime for the given engine, auto-detecting if unset
pub async fn create_runtime(engine: Option<Engine>) -> Box<dyn ContainerRuntime> {
    let engine = match engine {
        Some(engine) => engine,
        None => Engine::detect().await,
    };
    Box::new(CliRuntime::new(engine))
}
