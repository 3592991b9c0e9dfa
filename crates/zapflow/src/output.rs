// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output helpers shared by the commands.

use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;

pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn header(title: &str) {
    println!();
    println!("  {title}");
    println!("  {}", "-".repeat(35));
}

/// A `label: value` row with an OK/FAIL marker.
pub fn row(label: &str, value: &str, ok: bool) {
    let marker = match (use_color(), ok) {
        (true, true) => "✓".green().to_string(),
        (true, false) => "✗".red().to_string(),
        (false, true) => "[OK]".to_string(),
        (false, false) => "[FAIL]".to_string(),
    };
    println!("    {:<10}{marker} {value}", format!("{label}:"));
}

pub fn field(label: &str, value: &str) {
    println!("    {:<10}{value}", format!("{label}:"));
}

pub fn warning(message: &str) {
    if use_color() {
        eprintln!("{}: {message}", "warning".yellow());
    } else {
        eprintln!("warning: {message}");
    }
}
