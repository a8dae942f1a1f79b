//! Orchestration module for container engines
//!
//! Provides engine-agnostic container management over the Docker or
//! Podman command line.

mod cli_runtime;
pub mod container;
mod factory;
#[cfg(test)]
pub(crate) mod fake;
mod runtime;

pub use cli_runtime::CliRuntime;
pub use container::{ContainerSpec, ImageHandle, Mount, MountSource, TmpfsMount, VolumeInfo};
pub use factory::{create_runtime, Engine};
pub use runtime::ContainerRuntime;

use crate::error::{MatrixError, MatrixResult};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Read size for streamed exec output.
const CHUNK_SIZE: usize = 8 * 1024;

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> MatrixResult<Vec<String>> {
    let (stdout, stderr) = take_pipes(child)?;

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}

/// Forward raw stdout+stderr bytes from a child process into `sink`.
///
/// Chunks are sent in the order they are read, without any decoding, and
/// each send waits while the channel is full. Returns the number of bytes
/// forwarded.
pub(crate) async fn stream_child_chunks(
    child: &mut tokio::process::Child,
    sink: &mpsc::Sender<Vec<u8>>,
) -> MatrixResult<u64> {
    let (mut stdout, mut stderr) = take_pipes(child)?;

    let mut stdout_buf = vec![0u8; CHUNK_SIZE];
    let mut stderr_buf = vec![0u8; CHUNK_SIZE];
    let mut stderr_done = false;
    let mut stdout_done = false;
    let mut total = 0u64;

    while !stderr_done || !stdout_done {
        let chunk = tokio::select! {
            read = stderr.read(&mut stderr_buf), if !stderr_done => {
                match read {
                    Ok(n) if n > 0 => Some(stderr_buf[..n].to_vec()),
                    _ => {
                        stderr_done = true;
                        None
                    }
                }
            }
            read = stdout.read(&mut stdout_buf), if !stdout_done => {
                match read {
                    Ok(n) if n > 0 => Some(stdout_buf[..n].to_vec()),
                    _ => {
                        stdout_done = true;
                        None
                    }
                }
            }
        };

        if let Some(chunk) = chunk {
            total += chunk.len() as u64;
            sink.send(chunk)
                .await
                .map_err(|_| MatrixError::Internal("log writer stopped accepting output".to_string()))?;
        }
    }

    Ok(total)
}

fn take_pipes(
    child: &mut tokio::process::Child,
) -> MatrixResult<(tokio::process::ChildStdout, tokio::process::ChildStderr)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MatrixError::Internal("child stdout was not piped".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MatrixError::Internal("child stderr was not piped".to_string()))?;
    Ok((stdout, stderr))
}
