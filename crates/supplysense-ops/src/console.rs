//! Leveled, colored console output.
//!
//! These are the user-facing status lines; diagnostics go through the
//! `log` macros instead and are controlled by `-v`.

use colored::Colorize;

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", "✓".green(), message.as_ref().green());
}

pub fn info(message: impl AsRef<str>) {
    println!("{} {}", "ℹ".blue(), message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    println!("{} {}", "⚠".yellow(), message.as_ref().yellow());
}

pub fn error(message: impl AsRef<str>) {
    println!("{} {}", "✗".red(), message.as_ref().red());
}

/// A section header, underlined the width of its text.
pub fn header(message: impl AsRef<str>) {
    let message = message.as_ref();
    println!("\n{}", message.cyan());
    println!("{}", "=".repeat(message.chars().count()).cyan());
}

/// An indented detail line under a status line.
pub fn detail(message: impl AsRef<str>) {
    println!("  {}", message.as_ref());
}
