//! Consistent color theme and styling for terminal output.

use console::Style;
use std::io::IsTerminal;
use std::sync::LazyLock;

/// Global theme instance for consistent styling across the application.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Color theme for terminal output.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Success/positive indicators
    pub success: Style,
    /// Error/failure indicators
    pub error: Style,
    /// Warning/caution indicators
    pub warning: Style,
    /// Headers and knowledge-base labels
    pub header: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// File paths
    pub path: Style,
    /// Numbers, counts and distances
    pub number: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bright(),
            error: Style::new().red().bright(),
            warning: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            dim: Style::new().dim(),
            path: Style::new().magenta(),
            number: Style::new().cyan(),
        }
    }
}

impl Theme {
    /// Format a success message with checkmark.
    pub fn success_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.success, "✓"), self.apply(&self.success, text))
    }

    /// Format an error message with X mark.
    pub fn error_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.error, "✗"), self.apply(&self.error, text))
    }

    /// Format a warning message with warning sign.
    pub fn warning_with_icon(&self, text: &str) -> String {
        format!("{} {}", self.apply(&self.warning, "⚠"), self.apply(&self.warning, text))
    }

    /// Check if color output should be disabled.
    pub fn should_disable_colors() -> bool {
        std::env::var("NO_COLOR").is_ok() || !std::io::stdout().is_terminal()
    }

    /// Apply theme styling conditionally based on terminal support.
    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::should_disable_colors() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}
