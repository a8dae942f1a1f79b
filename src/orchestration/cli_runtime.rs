//! Container runtime backed by the Docker or Podman CLI
//!
//! Both engines accept the same command shapes for everything the pipeline
//! uses; the few differences are handled inline.

use crate::error::{MatrixError, MatrixResult};
use crate::orchestration::container::{ContainerSpec, VolumeInfo};
use crate::orchestration::factory::Engine;
use crate::orchestration::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Container runtime driving an engine binary
pub struct CliRuntime {
    engine: Engine,
}

impl CliRuntime {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(self.engine.binary());
        cmd.args(args).stdin(Stdio::null());
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.engine.binary(), args.join(" "))
    }

    /// Execute an engine command and return the output
    async fn exec_engine(&self, args: &[&str]) -> MatrixResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.engine.binary(), args);

        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    fn spawn_error(&self, args: &[&str], e: std::io::Error) -> MatrixError {
        if e.kind() == ErrorKind::NotFound {
            MatrixError::RuntimeNotFound(self.engine.binary().to_string())
        } else {
            MatrixError::command_failed(self.describe(args), e)
        }
    }

    /// Run a command that only reports success or failure
    async fn exec_checked(&self, args: &[&str]) -> MatrixResult<()> {
        let output = self.exec_engine(args).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MatrixError::command_exec(self.describe(args), stderr))
        }
    }

    /// Build the argument list for `create`
    fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "-w".to_string(),
            spec.workdir.clone(),
        ];

        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.volume_arg());
        }
        for tmpfs in &spec.tmpfs {
            args.push("--tmpfs".to_string());
            args.push(tmpfs.tmpfs_arg());
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

fn is_name_conflict(stderr: &str) -> bool {
    stderr.contains("already in use")
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no container with name or id")
}

fn parse_labels(value: &serde_json::Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn ensure_ready(&self) -> MatrixResult<()> {
        let output = self.exec_engine(&["version"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MatrixError::RuntimeUnavailable(stderr.trim().to_string()))
        }
    }

    async fn image_id(&self, tag: &str) -> MatrixResult<Option<String>> {
        let output = self
            .exec_engine(&["image", "inspect", "--format", "{{.Id}}", tag])
            .await?;

        if output.status.success() {
            let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    async fn build_image_with_progress(
        &self,
        context_dir: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> MatrixResult<()> {
        let context_str = context_dir.display().to_string();
        let args = ["build", "-t", tag, context_str.as_str()];
        debug!("Building image: {}", self.describe(&args));

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        let all_output = super::stream_child_output(&mut child, on_output).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| MatrixError::command_failed(self.describe(&args), e))?;

        if !status.success() {
            let combined = all_output.join("\n");
            let tail = super::build_error_output(&combined, "");
            return Err(MatrixError::ImageBuild {
                tag: tag.to_string(),
                reason: tail,
            });
        }

        info!("Image built: {}", tag);
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> MatrixResult<String> {
        let args = Self::create_args(spec);
        debug!("Creating container: {} {:?}", self.engine.binary(), args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec_engine(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            return Ok(container_id);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_name_conflict(&stderr) {
            Err(MatrixError::ContainerNameConflict(spec.name.clone()))
        } else {
            Err(MatrixError::ContainerCreate {
                name: spec.name.clone(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn start(&self, container: &str) -> MatrixResult<()> {
        debug!("Starting container: {}", container);

        let output = self.exec_engine(&["start", container]).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MatrixError::ContainerStart(stderr.trim().to_string()))
        }
    }

    async fn exec(
        &self,
        container: &str,
        command: &[String],
        sink: mpsc::Sender<Vec<u8>>,
    ) -> MatrixResult<i32> {
        let mut args = vec!["exec", container];
        args.extend(command.iter().map(String::as_str));
        debug!("Exec: {:?}", args);

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        let streamed = super::stream_child_chunks(&mut child, &sink).await;
        drop(sink);
        let bytes = streamed?;

        let status = child
            .wait()
            .await
            .map_err(|e| MatrixError::command_failed(self.describe(&args), e))?;

        debug!("Exec finished: {} bytes, status {}", bytes, status);
        Ok(status.code().unwrap_or(-1))
    }

    async fn stop(&self, container: &str) -> MatrixResult<()> {
        debug!("Stopping container: {}", container);
        self.exec_checked(&["stop", container]).await
    }

    async fn remove(&self, container: &str) -> MatrixResult<()> {
        debug!("Removing container: {}", container);

        let output = self.exec_engine(&["rm", "-f", container]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Ignore error if container doesn't exist
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                Ok(())
            } else {
                Err(MatrixError::command_exec(
                    format!("{} rm", self.engine.binary()),
                    stderr,
                ))
            }
        }
    }

    async fn container_exists(&self, container: &str) -> MatrixResult<bool> {
        let output = self
            .exec_engine(&["container", "inspect", "--format", "{{.Id}}", container])
            .await?;
        Ok(output.status.success())
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> MatrixResult<()> {
        debug!("Creating volume: {}", name);

        let mut args = vec!["volume", "create"];
        if self.engine == Engine::Podman {
            args.push("--ignore");
        }

        let label_strings: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        for label in &label_strings {
            args.push("--label");
            args.push(label);
        }

        args.push(name);

        let output = self.exec_engine(&args).await?;
        if output.status.success() {
            debug!("Volume created: {}", name);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MatrixError::CacheVolumeCreate {
                name: name.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn volume_inspect(&self, name: &str) -> MatrixResult<Option<VolumeInfo>> {
        let output = self.exec_engine(&["volume", "inspect", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("no such volume") {
                return Ok(None);
            }
            return Err(MatrixError::command_exec(
                format!("{} volume inspect", self.engine.binary()),
                stderr,
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);

        // Both engines print a JSON array, even for a single volume
        let volumes: Vec<serde_json::Value> = serde_json::from_str(&stdout)?;

        let vol = match volumes.first() {
            Some(v) => v,
            None => return Ok(None),
        };

        Ok(Some(VolumeInfo {
            name: name.to_string(),
            labels: parse_labels(&vol["Labels"]),
            mountpoint: vol["Mountpoint"].as_str().map(String::from),
            created_at: vol["CreatedAt"].as_str().map(String::from),
        }))
    }

    fn runtime_name(&self) -> &'static str {
        self.engine.name()
    }
}
