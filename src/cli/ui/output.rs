use console::style;

use crate::ai::ProviderStatus;
use crate::blueprint::{IssueSeverity, ValidationReport};
use crate::types::BlueprintError;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        println!("  {:<14} {}", style(key).dim(), value);
    }

    /// User-facing message and suggestions; the operator detail goes to logs
    pub fn blueprint_error(&self, err: &BlueprintError) {
        eprintln!(
            "{} {} {}",
            style("✗").red(),
            err.user_message,
            style(format!("[{}]", err.code)).dim()
        );
        for suggestion in &err.suggestions {
            eprintln!("  {} {}", style("→").cyan(), suggestion);
        }
    }

    pub fn validation(&self, report: &ValidationReport) {
        let score = match report.score {
            80..=100 => style(report.score).green(),
            50..=79 => style(report.score).yellow(),
            _ => style(report.score).red(),
        };
        println!("  {:<14} {}/100", style("Score").dim(), score.bold());

        for issue in &report.issues {
            let marker = match issue.severity {
                IssueSeverity::Error => style("✗").red(),
                IssueSeverity::Warning => style("⚠").yellow(),
            };
            println!("  {} {}", marker, issue.message);
        }
        for suggestion in &report.suggestions {
            println!("  {} {}", style("→").cyan(), suggestion);
        }
    }

    pub fn provider_status(&self, status: &ProviderStatus, reachable: Option<bool>) {
        let marker = if status.available && reachable != Some(false) {
            style("●").green()
        } else {
            style("●").red()
        };
        let reach = match reachable {
            Some(true) => style("reachable").green().to_string(),
            Some(false) => style("unreachable").red().to_string(),
            None => style("not probed").dim().to_string(),
        };
        println!(
            "  {} {:<16} circuit={:<9} rate_limited={:<5} {}",
            marker,
            status.provider,
            status.circuit_state.to_string(),
            status.rate_limited,
            reach
        );
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
