//! Colored CLI display utilities.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::exec::ProcessOutcome;
use crate::node::{NodeEnv, Notifier};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Placeholder shown for fields that were not found.
const MISSING: &str = "-";

/// Format one `name value` row, padding the name to a fixed column.
#[must_use]
pub fn format_row(name: &str, value: Option<&str>) -> String {
    format!("{:<22} {}", name, value.unwrap_or(MISSING))
}

/// Print every field of a node environment.
pub fn print_env(env: &NodeEnv) {
    for (name, value) in env.rows() {
        let row = format_row(name, value.as_deref());
        if value.is_some() {
            println!("{row}");
        } else {
            println!("{}", row.dimmed());
        }
    }
    let _ = io::stdout().flush();
}

/// Write raw process output straight through.
pub fn print_chunk(bytes: &[u8]) {
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(bytes);
    let _ = stdout.flush();
}

/// Print the summary line for a finished process.
pub fn print_exit(outcome: &ProcessOutcome) {
    let code = outcome
        .exit_code
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    let label = if outcome.success {
        "[EXIT]".green().bold().to_string()
    } else {
        "[EXIT]".red().bold().to_string()
    };
    eprintln!(
        "{} {} code={} pid={} elapsed={:.2?}",
        timestamp().dimmed(),
        label,
        code,
        outcome.pid.map_or_else(|| MISSING.to_string(), |p| p.to_string()),
        outcome.elapsed
    );
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stderr().flush();
}

/// Notifier that prints user-facing errors to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn error_message(&self, message: &str) {
        print_error(message);
    }
}
