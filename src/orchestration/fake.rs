//! In-memory container runtime for tests
//!
//! Records every call and lets tests script exec output, exit codes and
//! failures without a container engine.

use crate::error::{MatrixError, MatrixResult};
use crate::orchestration::container::{ContainerSpec, VolumeInfo};
use crate::orchestration::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};

/// Scripted result of an exec whose command contains a given marker
#[derive(Debug, Clone)]
pub struct ExecScript {
    pub chunks: Vec<Vec<u8>>,
    pub exit_code: i32,
    /// Fail the exec with an engine error instead of running it
    pub fail: bool,
    /// Never finish; `FakeRuntime::exec_hung` is notified on entry
    pub hang: bool,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub images: HashMap<String, String>,
    pub containers: HashMap<String, bool>,
    pub volumes: HashMap<String, HashMap<String, String>>,
    pub calls: Vec<String>,
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub specs: Vec<ContainerSpec>,
    pub execs: Vec<(String, Vec<String>)>,
    pub scripts: Vec<(String, ExecScript)>,
    pub fail_build: bool,
    pub fail_create: bool,
    pub fail_start: bool,
    pub fail_stop: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub state: Mutex<FakeState>,
    /// Notified when an exec scripted with `hang_exec` starts
    pub exec_hung: Notify,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime that already has the given image
    pub fn with_image(tag: &str) -> Self {
        let runtime = Self::new();
        runtime
            .state
            .lock()
            .unwrap()
            .images
            .insert(tag.to_string(), "sha256:feedfacecafebeef".to_string());
        runtime
    }

    /// Pretend a container with this name already exists
    pub fn add_container(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(name.to_string(), true);
    }

    /// Script every exec whose joined command contains `marker`
    pub fn script(&self, marker: &str, output: &str, exit_code: i32) {
        self.state.lock().unwrap().scripts.push((
            marker.to_string(),
            ExecScript {
                chunks: vec![output.as_bytes().to_vec()],
                exit_code,
                fail: false,
                hang: false,
            },
        ));
    }

    /// Make every exec whose joined command contains `marker` fail
    pub fn fail_exec(&self, marker: &str) {
        self.state.lock().unwrap().scripts.push((
            marker.to_string(),
            ExecScript {
                chunks: Vec::new(),
                exit_code: 0,
                fail: true,
                hang: false,
            },
        ));
    }

    /// Make every exec whose joined command contains `marker` block forever
    pub fn hang_exec(&self, marker: &str) {
        self.state.lock().unwrap().scripts.push((
            marker.to_string(),
            ExecScript {
                chunks: Vec::new(),
                exit_code: 0,
                fail: false,
                hang: true,
            },
        ));
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_ready(&self) -> MatrixResult<()> {
        Ok(())
    }

    async fn image_id(&self, tag: &str) -> MatrixResult<Option<String>> {
        self.record(format!("image_id {tag}"));
        Ok(self.state.lock().unwrap().images.get(tag).cloned())
    }

    async fn build_image_with_progress(
        &self,
        _context_dir: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> MatrixResult<()> {
        self.record(format!("build {tag}"));
        on_output("STEP 1/1: FROM scratch".to_string());

        let mut state = self.state.lock().unwrap();
        if state.fail_build {
            return Err(MatrixError::ImageBuild {
                tag: tag.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state
            .images
            .insert(tag.to_string(), "sha256:0123456789abcdef".to_string());
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> MatrixResult<String> {
        self.record(format!("create {}", spec.name));

        let mut state = self.state.lock().unwrap();
        if state.containers.contains_key(&spec.name) {
            return Err(MatrixError::ContainerNameConflict(spec.name.clone()));
        }
        if state.fail_create {
            return Err(MatrixError::ContainerCreate {
                name: spec.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        state.containers.insert(spec.name.clone(), false);
        state.created.push(spec.name.clone());
        state.specs.push(spec.clone());
        Ok(spec.name.clone())
    }

    async fn start(&self, container: &str) -> MatrixResult<()> {
        self.record(format!("start {container}"));

        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(MatrixError::ContainerStart("scripted failure".to_string()));
        }
        match state.containers.get_mut(container) {
            Some(running) => {
                *running = true;
                Ok(())
            }
            None => Err(MatrixError::ContainerStart(format!("no such container {container}"))),
        }
    }

    async fn exec(
        &self,
        container: &str,
        command: &[String],
        sink: mpsc::Sender<Vec<u8>>,
    ) -> MatrixResult<i32> {
        let joined = command.join(" ");
        self.record(format!("exec {container}"));

        let script = {
            let mut state = self.state.lock().unwrap();
            state.execs.push((container.to_string(), command.to_vec()));
            if state.containers.get(container) != Some(&true) {
                return Err(MatrixError::command_exec("exec", "container is not running"));
            }
            state
                .scripts
                .iter()
                .find(|(marker, _)| joined.contains(marker.as_str()))
                .map(|(_, script)| script.clone())
        };

        let script = script.unwrap_or(ExecScript {
            chunks: vec![format!("ran: {joined}\n").into_bytes()],
            exit_code: 0,
            fail: false,
            hang: false,
        });

        if script.fail {
            return Err(MatrixError::command_exec(joined, "scripted failure"));
        }
        if script.hang {
            self.exec_hung.notify_one();
            std::future::pending::<()>().await;
        }

        for chunk in script.chunks {
            sink.send(chunk)
                .await
                .map_err(|_| MatrixError::Internal("sink closed".to_string()))?;
        }
        Ok(script.exit_code)
    }

    async fn stop(&self, container: &str) -> MatrixResult<()> {
        self.record(format!("stop {container}"));

        let mut state = self.state.lock().unwrap();
        if state.fail_stop.contains(container) {
            return Err(MatrixError::command_exec("stop", "scripted failure"));
        }
        match state.containers.get_mut(container) {
            Some(running) => {
                *running = false;
                Ok(())
            }
            None => Err(MatrixError::command_exec("stop", "no such container")),
        }
    }

    async fn remove(&self, container: &str) -> MatrixResult<()> {
        self.record(format!("remove {container}"));

        let mut state = self.state.lock().unwrap();
        if state.containers.remove(container).is_some() {
            state.removed.push(container.to_string());
        }
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> MatrixResult<bool> {
        Ok(self.has_container(container))
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> MatrixResult<()> {
        self.record(format!("volume_create {name}"));
        self.state
            .lock()
            .unwrap()
            .volumes
            .entry(name.to_string())
            .or_insert_with(|| labels.clone());
        Ok(())
    }

    async fn volume_inspect(&self, name: &str) -> MatrixResult<Option<VolumeInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.volumes.get(name).map(|labels| VolumeInfo {
            name: name.to_string(),
            labels: labels.clone(),
            mountpoint: Some(format!("/var/lib/volumes/{name}/_data")),
            created_at: None,
        }))
    }

    fn runtime_name(&self) -> &'static str {
        "Fake"
    }
}
