//! Terminal output with a plain fallback for CI and pipes
//!
//! Uses `cliclack` for spinners and prompts when attached to a terminal,
//! and prints prefixed plain lines (`[OK]`, `[WARN]`) otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use cmake_matrix::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! ui::intro(&ctx, "cmake-matrix");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("[debug] Running cmake step");
//! // ... stream output ...
//! spinner.stop("[debug] cmake step finished in 12.4s (exit 0)");
//!
//! ui::outro_success(&ctx, "3 configurations finished");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, outro_warn, remark, section, step_ok,
    step_warn, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
pub use prompts::ask_line;
pub use theme::{init_theme, MatrixTheme};
