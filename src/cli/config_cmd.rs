//! Configuration CLI commands
//!
//! Inspect the effective configuration or write a starter TOML file.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use super::output::{self, OutputFormat};
use crate::config::{BootstrapConfig, ENV_CONFIG_FILE};

/// File written by `config init` when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "gofr-bootstrap.toml";

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Destination (defaults to --config, then GOFR_NP_CONFIG, then ./gofr-bootstrap.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration (defaults, file and environment merged)
    Show {
        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "yaml")]
        output: String,
    },

    /// Print the configuration file path in use
    Path,
}

/// The file the loader will read, if any.
pub fn resolved_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from))
}

pub async fn handle_config_command(command: ConfigCommands, explicit: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Init { path, force } => {
            let target = path
                .or_else(|| resolved_path(explicit))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            init_config(&target, force)
        }
        ConfigCommands::Show { output } => show_config(explicit, output.parse()?),
        ConfigCommands::Path => {
            match resolved_path(explicit) {
                Some(path) => println!("{}", path.display()),
                None => println!("<none: defaults and {}_* environment only>", crate::config::ENV_PREFIX),
            }
            Ok(())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Configuration file already exists at: {}\nUse --force to overwrite", path.display());
    }

    let rendered = render_default()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Configuration file created at: {}", path.display());
    println!("Use it with: gofr-bootstrap --config {} up", path.display());
    Ok(())
}

fn render_default() -> Result<String> {
    toml::to_string_pretty(&BootstrapConfig::default()).context("Failed to render default configuration")
}

fn show_config(explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = BootstrapConfig::load(explicit).context("Failed to load configuration")?;

    if format == OutputFormat::Table {
        print_config_table(&config);
        Ok(())
    } else {
        output::print_output(&config, format)
    }
}

fn print_config_table(config: &BootstrapConfig) {
    let rows = [
        ("project_name", config.project_name.clone()),
        ("vault.url", config.vault.url.clone()),
        ("vault.service_name", config.vault.service_name.clone()),
        ("vault.path_prefix", config.vault.path_prefix.clone()),
        ("vault.credential_services", config.vault.credential_services.join(",")),
        ("storage.secrets_dir", config.storage.secrets_dir.display().to_string()),
        ("distribution.targets", config.distribution.targets.join(",")),
        ("stack.compose_file", config.stack.compose_file.display().to_string()),
        ("stack.image_tag", config.stack.image_tag.clone()),
        ("stack.network", config.stack.network.clone()),
        ("health.max_attempts", config.health.max_attempts.to_string()),
        ("health.interval_seconds", config.health.interval_seconds.to_string()),
    ];

    output::print_table_header(&[("KEY", 28), ("VALUE", 50)]);
    for (key, value) in rows {
        println!("{:<28} {}", key, output::truncate(&value, 50));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_renders_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gofr.toml");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();

        let loaded = BootstrapConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.project_name, BootstrapConfig::default().project_name);
    }

    #[test]
    fn test_init_command_honours_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explicit.toml");

        let command = ConfigCommands::Init { path: None, force: false };
        tokio_test::block_on(handle_config_command(command, Some(&path))).unwrap();
        assert!(path.exists());

        let again = ConfigCommands::Init { path: None, force: false };
        assert!(tokio_test::block_on(handle_config_command(again, Some(&path))).is_err());
    }

    #[test]
    fn test_resolved_path_prefers_explicit() {
        let explicit = PathBuf::from("/etc/gofr/bootstrap.toml");
        assert_eq!(resolved_path(Some(&explicit)), Some(explicit.clone()));
    }
}
