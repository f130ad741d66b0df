//! Terminal display utilities for the CLI.
//!
//! Provides styled tables, progress bars, and themed status lines.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{create_hits_table, create_stats_table};
pub use theme::{THEME, Theme};
