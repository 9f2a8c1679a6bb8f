//! Report rendering.
//!
//! Every view has a text form for terminals and a JSON form for scripts.
//! Rendering never fails on odd process data: strings from the process
//! table are sanitized before they reach the terminal.

pub mod json;
pub mod text;

use clap::ValueEnum;

pub use json::{ambiguous_json, container_json, report_json};
pub use text::{ambiguous_text, container_text, relative_age, report_text, sanitize_terminal};

/// Which part of a report to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum View {
    /// Full report.
    #[default]
    Standard,
    /// Ancestry on one line.
    Short,
    /// Ancestry as an indented tree.
    Tree,
    /// Warnings only.
    Warnings,
    /// Environment variables only.
    Env,
}

/// ANSI colors, or nothing when color is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const MAGENTA: &'static str = "\x1b[35m";
    pub const CYAN: &'static str = "\x1b[36m";
    pub const DIM_YELLOW: &'static str = "\x1b[2;33m";

    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Wrap `text` in `color` and a reset.
    pub fn paint(&self, color: &str, text: &str) -> String {
        if self.enabled {
            format!("{color}{text}{}", Self::RESET)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette() {
        assert_eq!(Palette::new(false).paint(Palette::RED, "x"), "x");
        assert_eq!(Palette::new(true).paint(Palette::RED, "x"), "\x1b[31mx\x1b[0m");
    }
}
