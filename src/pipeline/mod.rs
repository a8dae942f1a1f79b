//! Per-configuration pipeline
//!
//! For one build configuration: prepare the result directory, create and
//! set up a container, run configure/compile/check with each stage's
//! output streamed into its own file, fix ownership of kept artifacts,
//! and tear the container down.
//!
//! A stage exiting non-zero does not stop the pipeline; every stage runs so
//! that as many logs as possible are collected. Engine errors propagate to
//! the caller, which owns failure cleanup.

pub mod command;
pub mod stage;

pub use stage::{ConfigurationReport, Stage, StageReport, FLAGS_FILE};

use crate::cache::CacheVolume;
use crate::config::{BuildConfig, Settings};
use crate::error::{MatrixError, MatrixResult};
use crate::lifecycle::ContainerManager;
use crate::log_writer::{format_elapsed, LogWriter, WriteMode};
use crate::orchestration::{ContainerSpec, ImageHandle, Mount, TmpfsMount};
use crate::ui::{self, TaskSpinner, UiContext};
use command::{render, shell_command, CommandContext};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Directory name for kept build artifacts inside a configuration's results
pub const BUILD_DIR_NAME: &str = "build";

/// Options shared by every configuration of a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Container name used for each configuration in turn
    pub container_name: String,
    /// Absolute host path of the project source
    pub source_path: PathBuf,
    /// Keep build artifacts on the host instead of in tmpfs
    pub keep_build: bool,
    /// Test filter passed to the unit test binary
    pub test_filter: Option<String>,
}

/// Runs the pipeline for one configuration at a time
pub struct ConfigurationRunner<'a> {
    manager: &'a ContainerManager<'a>,
    settings: &'a Settings,
    image: &'a ImageHandle,
    cache: &'a CacheVolume,
    options: &'a RunOptions,
    ctx: &'a UiContext,
}

impl<'a> ConfigurationRunner<'a> {
    pub fn new(
        manager: &'a ContainerManager<'a>,
        settings: &'a Settings,
        image: &'a ImageHandle,
        cache: &'a CacheVolume,
        options: &'a RunOptions,
        ctx: &'a UiContext,
    ) -> Self {
        Self {
            manager,
            settings,
            image,
            cache,
            options,
            ctx,
        }
    }

    /// Container layout for a configuration.
    ///
    /// `build_host_dir` is the host directory backing the build directory
    /// when artifacts are kept; otherwise the build directory is tmpfs.
    pub fn container_spec(&self, build_host_dir: Option<&Path>) -> ContainerSpec {
        let container = &self.settings.container;

        let mut mounts = vec![
            Mount::host(self.options.source_path.clone(), container.source_dir.clone()),
            self.cache.mount(&self.settings.cache.mount_path),
        ];
        let mut tmpfs = Vec::new();

        match build_host_dir {
            Some(dir) => mounts.push(Mount::host(dir, container.build_dir.clone())),
            None => tmpfs.push(TmpfsMount {
                target: container.build_dir.clone(),
                options: container.tmpfs_options.clone(),
            }),
        }

        ContainerSpec {
            name: self.options.container_name.clone(),
            image: self.image.tag.clone(),
            workdir: container.build_dir.clone(),
            mounts,
            tmpfs,
            command: container.keep_alive.clone(),
        }
    }

    /// Run every stage for `config`, writing results under `result_root`
    pub async fn run(
        &self,
        config: &BuildConfig,
        result_root: &Path,
    ) -> MatrixResult<ConfigurationReport> {
        let started = Instant::now();
        let result_dir = result_root.join(config.dir_name());
        create_dir(&result_dir).await?;

        LogWriter::new(result_dir.join(FLAGS_FILE), WriteMode::Text)
            .write_lines([config.flags.as_str(), "\n"])
            .await?;

        let build_host_dir = if self.options.keep_build {
            let dir = result_dir.join(BUILD_DIR_NAME);
            create_dir(&dir).await?;
            Some(dir)
        } else {
            None
        };

        let spec = self.container_spec(build_host_dir.as_deref());
        let mut stages = Vec::new();

        // Setup. Creation may prompt on a name conflict, outside any spinner
        let stage_start = Instant::now();
        let container = self.manager.create_container(&spec).await?;
        let mut spinner = TaskSpinner::new(self.ctx);
        spinner.start(&format!("[{}] Starting container", config.name));
        self.manager.start_and_setup(&container).await?;
        stages.push(StageReport {
            stage: Stage::Setup,
            exit_code: 0,
            bytes: 0,
            elapsed: stage_start.elapsed(),
        });
        spinner.stop(&format!(
            "[{}] Container ready ({})",
            config.name,
            format_elapsed(stage_start.elapsed())
        ));

        let (uid, gid) = match &build_host_dir {
            Some(dir) => host_owner(dir)?,
            None => (0, 0),
        };
        let command_ctx = CommandContext {
            source_dir: &self.settings.container.source_dir,
            build_dir: &self.settings.container.build_dir,
            jobs: self.settings.commands.jobs,
            flags: &config.flags,
            test_filter: self.options.test_filter.as_deref(),
            uid,
            gid,
        };

        for stage in Stage::LOGGED {
            let template = match stage {
                Stage::Configure => &self.settings.commands.configure,
                Stage::Compile => &self.settings.commands.compile,
                _ => &self.settings.commands.check,
            };
            let report = self
                .run_logged_stage(&container, &config.name, stage, &render(template, &command_ctx), &result_dir)
                .await?;
            stages.push(report);
        }

        if build_host_dir.is_some() {
            let stage_start = Instant::now();
            let cleanup = render(&self.settings.commands.cleanup, &command_ctx);
            let (exit_code, bytes) = self.manager.exec_to_debug_log(&container, &cleanup).await?;
            if exit_code != 0 {
                warn!("[{}] cleanup exited with {}", config.name, exit_code);
            }
            stages.push(StageReport {
                stage: Stage::Cleanup,
                exit_code,
                bytes,
                elapsed: stage_start.elapsed(),
            });
        }

        let stage_start = Instant::now();
        self.manager.teardown(&container).await?;
        stages.push(StageReport {
            stage: Stage::Teardown,
            exit_code: 0,
            bytes: 0,
            elapsed: stage_start.elapsed(),
        });
        ui::remark(
            self.ctx,
            &format!(
                "[{}] Container removed ({})",
                config.name,
                format_elapsed(stage_start.elapsed())
            ),
        );

        info!("Configuration {} finished", config.name);
        Ok(ConfigurationReport {
            name: config.name.clone(),
            flags: config.flags.clone(),
            result_dir,
            stages,
            elapsed: started.elapsed(),
        })
    }

    /// Run one stage command, streaming its output into the stage's file
    async fn run_logged_stage(
        &self,
        container: &str,
        config_name: &str,
        stage: Stage,
        command: &str,
        result_dir: &Path,
    ) -> MatrixResult<StageReport> {
        let file = stage
            .log_file()
            .ok_or_else(|| MatrixError::Internal(format!("stage {} has no log file", stage)))?;
        let writer = LogWriter::new(result_dir.join(file), WriteMode::Binary).timed(true);

        let mut spinner = TaskSpinner::new(self.ctx);
        spinner.start(&format!("[{}] Running {} step", config_name, stage));

        let argv = shell_command(&self.settings.container.shell, command);
        let (tx, rx) = LogWriter::channel();
        let (code, summary) = tokio::join!(
            self.manager.runtime().exec(container, &argv, tx),
            writer.drain(rx)
        );
        let summary = summary?;
        let exit_code = code?;
        let elapsed = summary.elapsed.unwrap_or_default();

        let message = format!(
            "[{}] {} step finished in {} (exit {})",
            config_name,
            stage,
            format_elapsed(elapsed),
            exit_code
        );
        if exit_code == 0 {
            spinner.stop(&message);
        } else {
            warn!("[{}] {} exited with {}", config_name, stage, exit_code);
            spinner.stop_warn(&message);
        }

        Ok(StageReport {
            stage,
            exit_code,
            bytes: summary.bytes,
            elapsed,
        })
    }
}

/// Create a fresh directory; results of an earlier run are never overwritten
async fn create_dir(path: &Path) -> MatrixResult<()> {
    tokio::fs::create_dir(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            MatrixError::ResultDirExists(path.to_path_buf())
        } else {
            MatrixError::io(format!("creating directory {}", path.display()), e)
        }
    })
}

/// Owner of a host path, used to hand kept artifacts back to the host user
#[cfg(unix)]
fn host_owner(path: &Path) -> MatrixResult<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path)
        .map_err(|e| MatrixError::io(format!("reading owner of {}", path.display()), e))?;
    Ok((meta.uid(), meta.gid()))
}

#[cfg(not(unix))]
fn host_owner(_path: &Path) -> MatrixResult<(u32, u32)> {
    Ok((0, 0))
}
