//! cmake-matrix - run CMake build configurations in throwaway containers
//!
//! CLI entry point.

use clap::Parser;
use cmake_matrix::cli::{Cli, LogFormat};
use cmake_matrix::config::ConfigManager;
use cmake_matrix::error::MatrixResult;
use cmake_matrix::lifecycle::{ConflictDecision, ConflictResolver, FixedResolver, TerminalResolver};
use cmake_matrix::orchestration::create_runtime;
use cmake_matrix::ui::{self, UiContext};
use console::style;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Time given to blocking tasks, such as an abandoned prompt, at exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} cannot start async runtime: {}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> MatrixResult<()> {
    let cli = Cli::parse();

    // 0 = warn (progress output only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("cmake_matrix=warn"),
        1 => EnvFilter::new("cmake_matrix=info"),
        _ => EnvFilter::new("cmake_matrix=debug"),
    };

    let ctx = match cli.log_format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .without_time()
                .init();
            UiContext::detect()
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            UiContext::non_interactive()
        }
    };
    ui::init_theme();

    let settings = match cli.settings {
        Some(ref path) => {
            let manager = ConfigManager::with_path(path.clone());
            manager.load_from_file(manager.path()).await?
        }
        None => ConfigManager::new().load().await?,
    };
    debug!("Settings: {:?}", settings);

    let runtime = create_runtime(cli.runtime).await;
    let resolver: Box<dyn ConflictResolver> = if cli.yes {
        Box::new(FixedResolver(ConflictDecision::Replace))
    } else {
        Box::new(TerminalResolver::new(ctx.clone()))
    };

    let options = cli.driver_options();
    cmake_matrix::driver::run(runtime.as_ref(), resolver.as_ref(), &settings, &options, &ctx).await?;
    Ok(())
}
