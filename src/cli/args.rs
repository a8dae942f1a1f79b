//! CLI argument definitions using clap derive

use crate::driver::DriverOptions;
use crate::orchestration::Engine;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// cmake-matrix - run CMake build configurations in throwaway containers
///
/// Configures, compiles and runs the unit tests under valgrind for every
/// entry of a YAML build matrix, one fresh container per entry, and keeps
/// the output of each step under a result directory.
#[derive(Parser, Debug)]
#[command(name = "cmake-matrix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML file with a `configs` list of `{name, config}` entries
    pub matrix: PathBuf,

    /// Name of the container used for each configuration
    #[arg(long, default_value = "cmake-matrix")]
    pub container: String,

    /// Project source directory mounted into the container
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Result directory [default: build-<unix seconds>]
    #[arg(long)]
    pub result_path: Option<PathBuf>,

    /// Only run unit tests matching this gtest filter
    #[arg(long)]
    pub test_filter: Option<String>,

    /// Keep build artifacts under each configuration's result directory
    #[arg(long, conflicts_with = "discard_build")]
    pub keep_build: bool,

    /// Build in tmpfs and drop artifacts with the container (default)
    #[arg(long)]
    pub discard_build: bool,

    /// Container engine [default: first of docker, podman found]
    #[arg(long, value_enum, env = "CMAKE_MATRIX_RUNTIME")]
    pub runtime: Option<Engine>,

    /// Settings file
    #[arg(long, env = "CMAKE_MATRIX_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Replace an existing container with the same name without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            matrix_path: self.matrix.clone(),
            source_path: self.path.clone(),
            result_path: self.result_path.clone(),
            container_name: self.container.clone(),
            keep_build: self.keep_build,
            test_filter: self.test_filter.clone(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}
