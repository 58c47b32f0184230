//! Styled terminal output utilities.

use std::time::Duration;

use owo_colors::OwoColorize;
use tidemark_migrate::{ExecutionResult, MigrationStatus};

/// Print a header/title
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "─".repeat(text.chars().count()).dimmed());
    println!();
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a list item
pub fn list_item(text: &str) {
    println!("  {} {}", "•".dimmed(), text);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Print one migration outcome with its warnings
pub fn migration_result(result: &ExecutionResult<'_>) {
    let name = result.migration.full_name();
    let elapsed = format_duration(result.duration).dimmed().to_string();
    let suffix = if result.dry_run { " (dry run)" } else { "" };

    match &result.error {
        None => println!(
            "{} {} {}{}",
            "✔".green().bold(),
            name,
            elapsed,
            suffix.dimmed()
        ),
        Some(err) => {
            println!("{} {} {}", "✖".red().bold(), name.red(), elapsed);
            println!("    {}", err.to_string().red());
        }
    }

    for warning in &result.warnings {
        println!("    {} {}", "⚠".yellow(), warning.yellow());
    }
}

/// Print one row of the status table
pub fn status_row(status: &MigrationStatus<'_>) {
    let version = format!("{:<16}", status.migration.version);
    let state = match status.applied_at {
        Some(at) => style_success(&format!("applied {}", at.format("%Y-%m-%d %H:%M:%S"))),
        None if status.applied => style_success("applied"),
        None => style_pending("pending"),
    };
    println!("  {} {:<40} {}", version.dimmed(), status.migration.name, state);
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Style text as success (green)
pub fn style_success(text: &str) -> String {
    text.green().to_string()
}

/// Style text as pending (yellow)
pub fn style_pending(text: &str) -> String {
    text.yellow().to_string()
}

/// Ask for confirmation
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} {} ", prompt, "[y/N]".dimmed());
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
