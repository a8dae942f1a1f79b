//! Streaming log capture
//!
//! Drains a byte-chunk channel into a file, flushing after every chunk so
//! partial logs survive a crash or an interrupted run.

use crate::error::{MatrixError, MatrixResult};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

/// Channel capacity between a running command and its log file.
pub const LOG_CHANNEL_CAPACITY: usize = 64;

/// How chunks are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Bytes are decoded as UTF-8, replacing invalid sequences
    Text,
    /// Bytes are written unchanged
    Binary,
}

/// What a finished drain wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSummary {
    pub bytes: u64,
    /// Wall-clock time, when timing was requested
    pub elapsed: Option<Duration>,
}

/// Writes one stream to one file
#[derive(Debug, Clone)]
pub struct LogWriter {
    path: PathBuf,
    mode: WriteMode,
    timed: bool,
}

impl LogWriter {
    pub fn new(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
            timed: false,
        }
    }

    /// Report elapsed wall-clock time in the summary
    pub fn timed(mut self, timed: bool) -> Self {
        self.timed = timed;
        self
    }

    /// A bounded channel sized for log streaming
    pub fn channel() -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        mpsc::channel(LOG_CHANNEL_CAPACITY)
    }

    /// Write every chunk from `stream` until its sender is dropped.
    ///
    /// The file is truncated first and closed on return, including on error.
    pub async fn drain(&self, mut stream: mpsc::Receiver<Vec<u8>>) -> MatrixResult<LogSummary> {
        let start = Instant::now();
        let mut file = File::create(&self.path)
            .await
            .map_err(|e| MatrixError::io(format!("creating log {}", self.path.display()), e))?;

        let mut bytes = 0u64;
        while let Some(chunk) = stream.recv().await {
            match self.mode {
                WriteMode::Binary => self.write_chunk(&mut file, &chunk).await?,
                WriteMode::Text => {
                    let text = String::from_utf8_lossy(&chunk);
                    self.write_chunk(&mut file, text.as_bytes()).await?;
                }
            }
            bytes += chunk.len() as u64;
        }

        let elapsed = self.timed.then(|| start.elapsed());
        debug!("Wrote {} bytes to {}", bytes, self.path.display());
        Ok(LogSummary { bytes, elapsed })
    }

    /// Write a fixed set of text lines, e.g. the flags of a configuration
    pub async fn write_lines<I, S>(&self, lines: I) -> MatrixResult<LogSummary>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (tx, rx) = Self::channel();
        let lines: Vec<Vec<u8>> = lines
            .into_iter()
            .map(|line| line.as_ref().as_bytes().to_vec())
            .collect();

        let produce = async move {
            for line in lines {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        };

        let ((), summary) = tokio::join!(produce, self.drain(rx));
        summary
    }

    async fn write_chunk(&self, file: &mut File, chunk: &[u8]) -> MatrixResult<()> {
        file.write_all(chunk)
            .await
            .map_err(|e| MatrixError::io(format!("writing log {}", self.path.display()), e))?;
        file.flush()
            .await
            .map_err(|e| MatrixError::io(format!("flushing log {}", self.path.display()), e))
    }
}

/// Format a duration for progress output (e.g. "1m 05s")
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
