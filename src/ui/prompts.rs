//! Interactive prompts with a non-interactive fallback

use super::context::UiContext;
use crate::error::{MatrixError, MatrixResult};
use std::io;

/// Ask a free-form question on the terminal.
///
/// Returns `None` without prompting when there is no terminal to ask on.
/// An empty answer is returned as an empty string; Ctrl-C or Esc at the
/// prompt is `Interrupted`.
pub async fn ask_line(ctx: &UiContext, message: &str) -> MatrixResult<Option<String>> {
    if !ctx.is_interactive() {
        return Ok(None);
    }

    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::input(&message)
            .placeholder("n")
            .required(false)
            .interact::<String>()
    })
    .await
    .map_err(|e| MatrixError::Internal(format!("Prompt task failed: {}", e)))?;

    result.map(Some).map_err(prompt_error)
}

fn prompt_error(e: io::Error) -> MatrixError {
    if e.kind() == io::ErrorKind::Interrupted {
        MatrixError::Interrupted
    } else {
        MatrixError::io("reading answer from terminal", e)
    }
}
