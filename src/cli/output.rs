//! Shared output formatting for CLI commands
//!
//! JSON, YAML and table renderings of the reports the bootstrap commands
//! produce.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::str::FromStr;

use crate::bootstrap::{ReadyReport, StatusReport};
use crate::stack::{HealthRecord, HealthStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            "table" => Ok(OutputFormat::Table),
            _ => anyhow::bail!(
                "Unsupported output format: '{}'. Use 'json', 'yaml', or 'table'.",
                s
            ),
        }
    }
}

/// Print data as JSON or YAML. Table output is rendered per report type.
pub fn print_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(data),
        OutputFormat::Yaml => print_yaml(data),
        OutputFormat::Table => {
            anyhow::bail!("Table format requires custom implementation per data type")
        }
    }
}

pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

fn status_cell(status: HealthStatus) -> String {
    let padded = format!("{:<10}", status.to_string());
    match status {
        HealthStatus::Healthy => padded.green().to_string(),
        HealthStatus::Starting => padded.yellow().to_string(),
        HealthStatus::Unhealthy | HealthStatus::Missing => padded.red().to_string(),
    }
}

const HEALTH_COLUMNS: [(&str, usize); 4] = [("SERVICE", 14), ("CONTAINER", 28), ("STATUS", 10), ("DETAIL", 40)];

pub fn print_health_table(records: &[HealthRecord]) {
    print_table_header(&HEALTH_COLUMNS);
    for record in records {
        println!(
            "{:<14} {:<28} {} {}",
            truncate(&record.service_name, 14),
            truncate(&record.container, 28),
            status_cell(record.status),
            truncate(record.detail.as_deref().unwrap_or("-"), 40)
        );
    }
    println!();
}

pub fn print_status(report: &StatusReport, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Table {
        return print_output(report, format);
    }

    match (&report.backend, &report.backend_error) {
        (Some(state), _) => println!("Secret backend: {}", state),
        (None, Some(error)) => println!("Secret backend: unreachable ({})", error),
        (None, None) => println!("Secret backend: unknown"),
    }
    print_health_table(&report.services);
    Ok(())
}

pub fn print_ready(report: &ReadyReport) {
    println!();
    println!("{:<26} {}", "STAGE", "OUTCOME");
    print_separator(40);
    for step in &report.steps {
        println!("{:<26} {}", step.stage.to_string(), step.transition);
    }
    if !report.credentials.is_empty() {
        println!();
        println!("Credentials published for: {}", report.credentials.join(", "));
    }
    print_health_table(&report.health);
}
