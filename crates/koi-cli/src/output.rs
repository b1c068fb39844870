//! Terminal rendering for command results.

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;

/// Banner above a block of output.
pub(crate) fn section(title: &str) {
    println!("\n{}", format!("=== {title} ===").cyan().bold());
}

/// Indented `key: value` line.
pub(crate) fn kv(key: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", key.white().bold(), value);
}

pub(crate) fn success(msg: &str) {
    println!("{} {msg}", "[OK]".green().bold());
}

pub(crate) fn warning(msg: &str) {
    println!("{} {msg}", "[WARN]".yellow().bold());
}

/// Pretty JSON on stdout, for `--json`.
pub(crate) fn json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Disposition label coloured by class.
pub(crate) fn disposition(label: &str) -> String {
    let styled = match label {
        "CONFIRMED" => label.green(),
        "CANDIDATE" => label.yellow(),
        "FALSE POSITIVE" => label.red(),
        _ => label.magenta(),
    };
    styled.bold().to_string()
}
