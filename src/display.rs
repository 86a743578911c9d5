//! Colored CLI display utilities for supervisor output.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal while the `hatlink` binary drives a worker.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::supervisor::{Fill, LinkStatus};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Print a client status change.
pub fn print_status(worker: &str, status: LinkStatus) {
    let indicator = status.indicator();
    let label = match indicator.fill {
        Fill::Green => format!("[{}]", indicator.text).green().bold().to_string(),
        Fill::Red => format!("[{}]", indicator.text).red().bold().to_string(),
    };
    println!("{} {} {}", timestamp().dimmed(), label, worker.cyan());
    let _ = io::stdout().flush();
}

/// Print the result of a successful worker check.
pub fn print_worker_ok(path: &Path) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[CHECK]".green().bold(),
        path.display().to_string().cyan()
    );
    let _ = io::stdout().flush();
}

/// Print an input line that was not forwarded.
pub fn print_ignored(input: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[IGNORED]".yellow().bold(),
        truncate(input, DEFAULT_MAX_LEN).dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        message
    );
}
