//! Runs a whole build matrix
//!
//! Loads the matrix, prepares the result root, image and cache volume, then
//! runs each configuration in turn. Failures and Ctrl-C fall through to a
//! guard that force-removes the named container before the error is
//! returned.

use crate::cache::ensure_cache_volume;
use crate::config::{BuildMatrix, Settings};
use crate::error::{MatrixError, MatrixResult};
use crate::lifecycle::{ConflictResolver, ContainerManager};
use crate::log_writer::format_elapsed;
use crate::orchestration::ContainerRuntime;
use crate::pipeline::{ConfigurationReport, ConfigurationRunner, RunOptions};
use crate::ui::{self, UiContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-run report written next to the configuration directories
pub const SUMMARY_FILE: &str = "summary.json";

/// What to run and where
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// YAML file with the `configs` list
    pub matrix_path: PathBuf,
    /// Project source on the host
    pub source_path: PathBuf,
    /// Result root; `build-<unix seconds>` when unset
    pub result_path: Option<PathBuf>,
    pub container_name: String,
    pub keep_build: bool,
    pub test_filter: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub runtime: String,
    pub image: String,
    pub image_id: String,
    pub result_dir: PathBuf,
    pub configurations: Vec<ConfigurationReport>,
}

impl RunReport {
    /// Configurations with at least one stage that exited non-zero
    pub fn failed_configurations(&self) -> usize {
        self.configurations
            .iter()
            .filter(|c| c.failed_stages().next().is_some())
            .count()
    }
}

/// Default result root for a run started at `started_at`
pub fn default_result_dir(started_at: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("build-{}", started_at.timestamp()))
}

/// Run the matrix, treating Ctrl-C as an interruption
pub async fn run(
    runtime: &dyn ContainerRuntime,
    resolver: &dyn ConflictResolver,
    settings: &Settings,
    options: &DriverOptions,
    ctx: &UiContext,
) -> MatrixResult<RunReport> {
    run_with_shutdown(runtime, resolver, settings, options, ctx, ctrl_c()).await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Run the matrix until it finishes or `shutdown` resolves
pub async fn run_with_shutdown<F>(
    runtime: &dyn ContainerRuntime,
    resolver: &dyn ConflictResolver,
    settings: &Settings,
    options: &DriverOptions,
    ctx: &UiContext,
    shutdown: F,
) -> MatrixResult<RunReport>
where
    F: Future<Output = ()>,
{
    let matrix = BuildMatrix::load(&options.matrix_path).await?;
    info!(
        "Loaded {} configurations from {}",
        matrix.len(),
        options.matrix_path.display()
    );

    let source_path = tokio::fs::canonicalize(&options.source_path)
        .await
        .map_err(|e| {
            MatrixError::io(
                format!("resolving source path {}", options.source_path.display()),
                e,
            )
        })?;

    runtime.ensure_ready().await?;

    let started_at = Utc::now();
    let result_dir = options
        .result_path
        .clone()
        .unwrap_or_else(|| default_result_dir(started_at));
    tokio::fs::create_dir_all(&result_dir)
        .await
        .map_err(|e| MatrixError::io(format!("creating {}", result_dir.display()), e))?;

    ui::intro(ctx, "cmake-matrix");
    ui::key_value(ctx, "Engine", runtime.runtime_name());
    ui::key_value(ctx, "Source", &source_path.display().to_string());
    ui::key_value(ctx, "Results", &result_dir.display().to_string());

    let manager = ContainerManager::new(runtime, resolver, settings, ctx);
    let run_options = RunOptions {
        container_name: options.container_name.clone(),
        source_path,
        keep_build: options.keep_build,
        test_filter: options.test_filter.clone(),
    };
    let work = execute(&manager, settings, &matrix, &run_options, &result_dir, started_at, ctx);

    let outcome = tokio::select! {
        biased;
        _ = shutdown => {
            ui::step_warn(ctx, "Interrupted, cleaning up");
            Err(MatrixError::Interrupted)
        }
        result = work => result,
    };

    match outcome {
        Ok(report) => {
            write_summary(&report).await?;
            print_summary(&report, ctx);
            Ok(report)
        }
        Err(e) => {
            if manager.holds_container() && !e.leaves_foreign_container() {
                force_cleanup(&manager, &options.container_name, ctx).await;
            }
            Err(e)
        }
    }
}

async fn execute(
    manager: &ContainerManager<'_>,
    settings: &Settings,
    matrix: &BuildMatrix,
    options: &RunOptions,
    result_dir: &Path,
    started_at: DateTime<Utc>,
    ctx: &UiContext,
) -> MatrixResult<RunReport> {
    let image = manager.ensure_image(&settings.image.tag()).await?;
    ui::step_ok(ctx, &format!("Image {} ({})", image.tag, image.short_id()));

    let cache = ensure_cache_volume(manager.runtime(), &settings.cache.volume).await?;
    if let Some(ref mountpoint) = cache.mountpoint {
        debug!("Cache volume {} at {}", cache.name, mountpoint);
    }
    if cache.created_now {
        ui::step_ok(ctx, &format!("Created cache volume {}", cache.name));
    } else {
        let since = cache
            .created_at
            .map(|t| format!(", created {}", t.format("%Y-%m-%d")))
            .unwrap_or_default();
        ui::step_ok(ctx, &format!("Using cache volume {}{}", cache.name, since));
    }

    let runner = ConfigurationRunner::new(manager, settings, &image, &cache, options, ctx);
    let total = matrix.len();
    let mut configurations = Vec::with_capacity(total);

    for (index, config) in matrix.configs.iter().enumerate() {
        ui::section(ctx, &format!("[{}/{}] {}", index + 1, total, config.name));
        debug!("Flags for {}: {}", config.name, config.flags);

        let report = runner.run(config, result_dir).await?;
        configurations.push(report);
    }

    Ok(RunReport {
        started_at,
        runtime: manager.runtime().runtime_name().to_string(),
        image: image.tag,
        image_id: image.id,
        result_dir: result_dir.to_path_buf(),
        configurations,
    })
}

/// Stop and remove the named container after a failure, reporting the outcome
async fn force_cleanup(manager: &ContainerManager<'_>, container: &str, ctx: &UiContext) {
    match manager.runtime().container_exists(container).await {
        Ok(false) => ui::remark(ctx, &format!("No container {} to clean up", container)),
        Ok(true) => match manager.teardown(container).await {
            Ok(()) => ui::step_ok(ctx, &format!("Removed container {}", container)),
            Err(e) => {
                warn!("Cleanup of {} failed: {}", container, e);
                ui::step_warn_hint(
                    ctx,
                    &format!("Could not remove container {}", container),
                    &format!("remove it manually: {} rm -f {}", engine_binary(manager), container),
                );
            }
        },
        Err(e) => {
            warn!("Cannot look up container {}: {}", container, e);
            ui::step_warn_hint(
                ctx,
                &format!("Could not check for container {}", container),
                "it may still be running",
            );
        }
    }
}

fn engine_binary(manager: &ContainerManager<'_>) -> String {
    manager.runtime().runtime_name().to_lowercase()
}

async fn write_summary(report: &RunReport) -> MatrixResult<()> {
    let path = report.result_dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| MatrixError::io(format!("writing {}", path.display()), e))
}

fn print_summary(report: &RunReport, ctx: &UiContext) {
    ui::section(ctx, "Summary");
    for config in &report.configurations {
        let failed: Vec<String> = config
            .failed_stages()
            .map(|s| format!("{} (exit {})", s.stage, s.exit_code))
            .collect();
        let elapsed = format_elapsed(config.elapsed);

        if failed.is_empty() {
            ui::key_value_status(ctx, &config.name, &format!("ok in {}", elapsed), true);
        } else {
            ui::key_value_status(
                ctx,
                &config.name,
                &format!("{} in {}", failed.join(", "), elapsed),
                false,
            );
        }
    }

    let message = format!(
        "{} configurations finished, results in {}",
        report.configurations.len(),
        report.result_dir.display()
    );
    if report.failed_configurations() == 0 {
        ui::outro_success(ctx, &message);
    } else {
        ui::outro_warn(ctx, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ConflictDecision, FixedResolver};
    use crate::orchestration::fake::FakeRuntime;
    use crate::pipeline::Stage;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Never answers, like an operator who walks away from the prompt
    #[derive(Default)]
    struct StallingResolver {
        asked: Notify,
    }

    #[async_trait]
    impl ConflictResolver for StallingResolver {
        async fn resolve(&self, _container: &str) -> MatrixResult<ConflictDecision> {
            self.asked.notify_one();
            std::future::pending::<MatrixResult<ConflictDecision>>().await
        }
    }

    const MATRIX: &str = r#"
configs:
  - name: debug
    config: -DCMAKE_BUILD_TYPE=Debug
  - name: release
    config: -DCMAKE_BUILD_TYPE=Release
  - name: asan
    config: -DENABLE_ASAN=ON
"#;

    struct Fixture {
        runtime: FakeRuntime,
        settings: Settings,
        ctx: UiContext,
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = Settings::default();
            let temp = TempDir::new().unwrap();
            std::fs::create_dir(temp.path().join("src")).unwrap();
            std::fs::write(temp.path().join("matrix.yaml"), MATRIX).unwrap();
            Self {
                runtime: FakeRuntime::with_image(&settings.image.tag()),
                settings,
                ctx: UiContext::non_interactive(),
                temp,
            }
        }

        fn options(&self, results: &str) -> DriverOptions {
            DriverOptions {
                matrix_path: self.temp.path().join("matrix.yaml"),
                source_path: self.temp.path().join("src"),
                result_path: Some(self.temp.path().join(results)),
                container_name: "matrix".to_string(),
                keep_build: false,
                test_filter: None,
            }
        }

        async fn run(&self, options: &DriverOptions, decision: ConflictDecision) -> MatrixResult<RunReport> {
            let resolver = FixedResolver(decision);
            run_with_shutdown(
                &self.runtime,
                &resolver,
                &self.settings,
                options,
                &self.ctx,
                std::future::pending(),
            )
            .await
        }
    }

    #[test]
    fn default_result_dir_uses_unix_seconds() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(default_result_dir(ts), PathBuf::from("build-1700000000"));
    }

    #[tokio::test]
    async fn one_result_directory_per_configuration() {
        let fx = Fixture::new();
        let report = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();

        assert_eq!(report.configurations.len(), 3);
        let root = fx.temp.path().join("out");
        let mut dirs: Vec<String> = std::fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        assert_eq!(dirs, vec!["config-asan", "config-debug", "config-release"]);
    }

    #[tokio::test]
    async fn logs_exist_despite_failing_stages() {
        let fx = Fixture::new();
        fx.runtime.script("cmake", "CMake Error\n", 1);
        fx.runtime.script("valgrind", "definitely lost: 8 bytes\n", 1);

        let report = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();
        assert_eq!(report.failed_configurations(), 3);

        for name in ["debug", "release", "asan"] {
            let dir = fx.temp.path().join("out").join(format!("config-{name}"));
            for file in ["cmake_config.txt", "cmake_output.txt", "build_output.txt", "valgrind_output.txt"] {
                assert!(dir.join(file).exists(), "{name}/{file} missing");
            }
        }
    }

    #[tokio::test]
    async fn summary_records_exit_codes() {
        let fx = Fixture::new();
        fx.runtime.script("make -j", "error\n", 2);

        fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();

        let summary = std::fs::read_to_string(fx.temp.path().join("out").join(SUMMARY_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary).unwrap();
        let stages = json["configurations"][0]["stages"].as_array().unwrap();
        let compile = stages.iter().find(|s| s["stage"] == "compile").unwrap();
        assert_eq!(compile["exit_code"], 2);
        assert_eq!(json["runtime"], "Fake");
    }

    #[tokio::test]
    async fn missing_matrix_fails_before_engine() {
        let fx = Fixture::new();
        let options = DriverOptions {
            matrix_path: fx.temp.path().join("nope.yaml"),
            ..fx.options("out")
        };

        let err = fx.run(&options, ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::MatrixNotFound(_)));
        assert!(fx.runtime.calls().is_empty());
        assert!(!fx.temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn failure_mid_pipeline_removes_container() {
        let fx = Fixture::new();
        fx.runtime.fail_exec("valgrind");

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::CommandExecution { .. }));
        assert!(!fx.runtime.has_container("matrix"));

        // A rerun with the same name must not hit a conflict
        fx.runtime.state.lock().unwrap().scripts.clear();
        fx.run(&fx.options("out2"), ConflictDecision::Decline).await.unwrap();
    }

    #[tokio::test]
    async fn declined_conflict_leaves_existing_container() {
        let fx = Fixture::new();
        fx.runtime.add_container("matrix");

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::ContainerConflictDeclined(_)));

        let state = fx.runtime.state.lock().unwrap();
        assert!(state.created.is_empty());
        assert!(state.removed.is_empty());
        assert_eq!(state.containers.get("matrix"), Some(&true));
    }

    #[tokio::test]
    async fn replaced_conflict_runs_everything() {
        let fx = Fixture::new();
        fx.runtime.add_container("matrix");

        let report = fx.run(&fx.options("out"), ConflictDecision::Replace).await.unwrap();
        assert_eq!(report.configurations.len(), 3);

        let state = fx.runtime.state.lock().unwrap();
        assert_eq!(state.created.len(), 3);
        assert_eq!(state.removed.len(), 4);
        assert!(!state.containers.contains_key("matrix"));
    }

    #[tokio::test]
    async fn containers_balance_per_configuration() {
        let fx = Fixture::new();
        fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();

        let state = fx.runtime.state.lock().unwrap();
        assert_eq!(state.created.len(), 3);
        assert_eq!(state.removed.len(), 3);
        assert!(state.containers.is_empty());
    }

    #[tokio::test]
    async fn cache_volume_created_once_and_kept() {
        let fx = Fixture::new();
        fx.run(&fx.options("first"), ConflictDecision::Decline).await.unwrap();
        fx.run(&fx.options("second"), ConflictDecision::Decline).await.unwrap();

        let creates = fx
            .runtime
            .calls()
            .iter()
            .filter(|c| c.starts_with("volume_create"))
            .count();
        assert_eq!(creates, 1);
        assert!(fx
            .runtime
            .state
            .lock()
            .unwrap()
            .volumes
            .contains_key(&fx.settings.cache.volume));
    }

    #[tokio::test]
    async fn discard_build_leaves_no_artifacts() {
        let fx = Fixture::new();
        let report = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();

        for config in &report.configurations {
            assert!(!config.result_dir.join("build").exists());
            assert!(config.stage(Stage::Cleanup).is_none());
        }
    }

    #[tokio::test]
    async fn keep_build_creates_build_dirs() {
        let fx = Fixture::new();
        let options = DriverOptions {
            keep_build: true,
            ..fx.options("out")
        };
        let report = fx.run(&options, ConflictDecision::Decline).await.unwrap();

        for config in &report.configurations {
            assert!(config.result_dir.join("build").is_dir());
            assert!(config.stage(Stage::Cleanup).is_some());
        }
    }

    #[tokio::test]
    async fn interruption_before_containers_is_reported() {
        let fx = Fixture::new();
        let resolver = FixedResolver(ConflictDecision::Decline);

        let err = run_with_shutdown(
            &fx.runtime,
            &resolver,
            &fx.settings,
            &fx.options("out"),
            &fx.ctx,
            async {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MatrixError::Interrupted));
        assert!(fx.runtime.state.lock().unwrap().created.is_empty());
    }

    #[tokio::test]
    async fn start_failure_removes_container() {
        let fx = Fixture::new();
        fx.runtime.state.lock().unwrap().fail_start = true;

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::ContainerStart(_)));

        assert!(!fx.runtime.has_container("matrix"));
        assert_eq!(fx.runtime.state.lock().unwrap().removed, vec!["matrix"]);
    }

    #[tokio::test]
    async fn setup_failure_removes_container() {
        let fx = Fixture::new();
        fx.runtime.script("mkdir", "mkdir: cannot create directory\n", 1);

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::ContainerSetup { code: 1, .. }));

        assert!(!fx.runtime.has_container("matrix"));
        assert_eq!(fx.runtime.state.lock().unwrap().removed, vec!["matrix"]);
    }

    #[tokio::test]
    async fn interruption_mid_stage_removes_container() {
        let fx = Fixture::new();
        fx.runtime.hang_exec("make -j");
        let resolver = FixedResolver(ConflictDecision::Decline);

        let err = run_with_shutdown(
            &fx.runtime,
            &resolver,
            &fx.settings,
            &fx.options("out"),
            &fx.ctx,
            fx.runtime.exec_hung.notified(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MatrixError::Interrupted));
        assert!(!fx.runtime.has_container("matrix"));
        assert_eq!(fx.runtime.state.lock().unwrap().removed, vec!["matrix"]);

        let dir = fx.temp.path().join("out").join("config-debug");
        assert!(dir.join("cmake_output.txt").exists());
    }

    #[tokio::test]
    async fn interruption_at_conflict_prompt_keeps_existing_container() {
        let fx = Fixture::new();
        fx.runtime.add_container("matrix");
        let resolver = StallingResolver::default();

        let err = run_with_shutdown(
            &fx.runtime,
            &resolver,
            &fx.settings,
            &fx.options("out"),
            &fx.ctx,
            resolver.asked.notified(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MatrixError::Interrupted));
        let state = fx.runtime.state.lock().unwrap();
        assert!(state.removed.is_empty());
        assert!(state.created.is_empty());
        assert_eq!(state.containers.get("matrix"), Some(&true));
        assert!(!state.calls.iter().any(|c| c.starts_with("stop")));
    }

    #[tokio::test]
    async fn rerun_into_same_results_is_refused() {
        let fx = Fixture::new();
        fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap();

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::ResultDirExists(_)));

        let state = fx.runtime.state.lock().unwrap();
        assert_eq!(state.created.len(), 3);
        assert!(state.containers.is_empty());
    }

    #[tokio::test]
    async fn image_build_failure_creates_no_container() {
        let fx = Fixture {
            runtime: FakeRuntime::new(),
            ..Fixture::new()
        };
        fx.runtime.state.lock().unwrap().fail_build = true;

        let err = fx.run(&fx.options("out"), ConflictDecision::Decline).await.unwrap_err();
        assert!(matches!(err, MatrixError::ImageBuild { .. }));
        assert!(fx.runtime.state.lock().unwrap().created.is_empty());
        assert!(!fx.runtime.calls().iter().any(|c| c.starts_with("remove")));
    }
}
