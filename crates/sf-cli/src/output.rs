//! Output formatting utilities.

use colored::Colorize;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

/// Prints a success message.
pub fn success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints a labelled value.
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("{:>14} {value}", format!("{label}:").bold());
}

/// Prints a section heading.
pub fn heading(title: &str) {
    println!("{}", title.cyan().bold());
}

/// Outputs a single item, as text through `text` or as pretty JSON.
pub fn output_single<T: Serialize>(
    item: &T,
    format: OutputFormat,
    text: impl FnOnce(&T),
) -> crate::CliResult<()> {
    match format {
        OutputFormat::Text => text(item),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
    }
    Ok(())
}
