//! Container runtime abstraction
//!
//! Provides a trait for the container engine operations the pipeline needs,
//! so the lifecycle code can run against Docker, Podman, or an in-memory
//! fake in tests.

use crate::error::MatrixResult;
use crate::orchestration::container::{ContainerSpec, VolumeInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;

/// Abstract container engine interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fail with an actionable error if the engine cannot be used
    async fn ensure_ready(&self) -> MatrixResult<()>;

    /// Look up a local image, returning its id
    async fn image_id(&self, tag: &str) -> MatrixResult<Option<String>>;

    /// Build an image from a local context, reporting each output line
    async fn build_image_with_progress(
        &self,
        context_dir: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> MatrixResult<()>;

    /// Create (but do not start) a container and return its id.
    ///
    /// Fails with `MatrixError::ContainerNameConflict` when the name is taken.
    async fn create(&self, spec: &ContainerSpec) -> MatrixResult<String>;

    /// Start a created container
    async fn start(&self, container: &str) -> MatrixResult<()>;

    /// Run a command inside a running container.
    ///
    /// Combined stdout/stderr is sent to `sink` chunk by chunk as it is
    /// produced; the sender is dropped when the command ends. Returns the
    /// command's exit code (-1 if it was killed by a signal).
    async fn exec(
        &self,
        container: &str,
        command: &[String],
        sink: mpsc::Sender<Vec<u8>>,
    ) -> MatrixResult<i32>;

    /// Stop a container gracefully
    async fn stop(&self, container: &str) -> MatrixResult<()>;

    /// Remove a container (succeeds if it is already gone)
    async fn remove(&self, container: &str) -> MatrixResult<()>;

    /// Check whether a container with this name or id exists
    async fn container_exists(&self, container: &str) -> MatrixResult<bool>;

    /// Create a named volume with labels (no-op if it exists)
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>)
        -> MatrixResult<()>;

    /// Inspect a named volume
    async fn volume_inspect(&self, name: &str) -> MatrixResult<Option<VolumeInfo>>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
