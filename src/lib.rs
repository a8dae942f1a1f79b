//! cmake-matrix - run CMake build configurations in throwaway containers
//!
//! Each configuration of a build matrix gets a fresh container with the
//! project source and a shared ccache volume mounted; the output of the
//! configure, compile and valgrind steps is captured per configuration.

pub mod cache;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod log_writer;
pub mod orchestration;
pub mod pipeline;
pub mod ui;

pub use error::{MatrixError, MatrixResult};
