//! Custom theme for cliclack prompts and spinners
//!
//! A stage that exits non-zero ends its spinner in the error state, which is
//! a warning here: the matrix keeps going. Red is kept for a cancelled prompt,
//! which aborts the whole run.

use cliclack::ThemeState;
use console::Style;

/// Tick characters shared by stage spinners and the image build bar
pub(crate) const SPINNER_TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

#[derive(Debug, Clone, Default)]
pub struct MatrixTheme;

impl cliclack::Theme for MatrixTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().yellow(),
            ThemeState::Cancel => Style::new().red(),
            ThemeState::Submit => Style::new().cyan().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().cyan(),
            ThemeState::Error(_) => Style::new().yellow().bold(),
            ThemeState::Cancel => Style::new().red().bold(),
            ThemeState::Submit => Style::new().green(),
        }
    }

    /// The conflict answer stays readable once submitted
    fn input_style(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Cancel => Style::new().dim().strikethrough(),
            ThemeState::Submit => Style::new().bold(),
            _ => Style::new(),
        }
    }

    fn spinner_chars(&self) -> String {
        SPINNER_TICKS.to_string()
    }
}

/// Initialize the global theme
pub fn init_theme() {
    cliclack::set_theme(MatrixTheme);
}
