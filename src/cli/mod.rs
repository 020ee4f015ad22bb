//! # Command Line Interface
//!
//! `gofr-bootstrap` subcommands: bring the stack up, tear it down, report
//! status, provision a single service credential, mint a test token and
//! inspect configuration.

pub mod config_cmd;
pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::{mint_test_token, BootstrapContext, BootstrapOrchestrator, TestTokenRequest};
use crate::config::BootstrapConfig;
use crate::errors::{BootstrapError, StageError};
use crate::observability::{init_logging, log_config_info};
use crate::secrets::{SecretBackend, SecretsError, VaultHttpBackend};
use crate::stack::{ContainerRuntime, DockerCli, DOCKER_INSTALL_HINT};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "gofr-bootstrap")]
#[command(about = "Bootstrap orchestrator for the GOFR-NP service stack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file (overrides GOFR_NP_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring the stack to a healthy, credentialed state
    Up {
        /// Rebuild the service image even when it exists
        #[arg(long)]
        force_rebuild: bool,
    },

    /// Stop the stack
    Down {
        /// Also remove the stack's volumes (shared volumes are kept)
        #[arg(long)]
        purge_volumes: bool,

        /// Also remove published credentials from every distribution target
        #[arg(long)]
        purge_secrets: bool,
    },

    /// Show secret backend state and per-service health
    Status {
        /// Output format (json, yaml, or table)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Ensure one service has valid credentials
    Credentials {
        /// Service name, e.g. gofr-np-mcp
        service: String,
    },

    /// Mint a long-lived bearer token for test harnesses
    TestToken {
        /// Env file to write GOFR_NP_TEST_TOKEN=<jwt> into
        #[arg(long, default_value = ".env.test")]
        out: PathBuf,

        /// Token subject name
        #[arg(long, default_value = "gofr-np-test")]
        name: String,

        /// Group granted by the token (repeatable)
        #[arg(long = "group", default_value = "public")]
        groups: Vec<String>,

        /// Token lifetime in days
        #[arg(long, default_value_t = 3650)]
        days: i64,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        command: config_cmd::ConfigCommands,
    },
}

/// Run CLI commands
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { command } = cli.command {
        return config_cmd::handle_config_command(command, cli.config.as_deref()).await;
    }

    let config = BootstrapConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.observability, cli.verbose);
    log_config_info(&config);

    let mut ctx = BootstrapContext::new(config)?;

    match cli.command {
        Commands::Up { force_rebuild } => {
            ctx.force_rebuild |= force_rebuild;
            let orchestrator = orchestrator(&ctx, cancel_on_ctrl_c())?;
            match orchestrator.ensure_ready(&mut ctx).await {
                Ok(report) => {
                    output::print_ready(&report);
                    println!("{}", "Stack ready.".green());
                }
                Err(error) => {
                    print_stage_error(&error);
                    return Err(error.into());
                }
            }
        }
        Commands::Down { purge_volumes, purge_secrets } => {
            let orchestrator = orchestrator(&ctx, CancellationToken::new())?;
            let warnings = orchestrator.teardown(&ctx, purge_volumes, purge_secrets).await?;
            if warnings.is_empty() {
                println!("Stack stopped.");
            } else {
                println!("{}", format!("Stack stopped with {} warning(s):", warnings.len()).yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Commands::Status { output: requested } => {
            let format: OutputFormat = requested.parse()?;
            let orchestrator = orchestrator(&ctx, CancellationToken::new())?;
            let report = orchestrator.status(&ctx).await?;
            output::print_status(&report, format)?;
        }
        Commands::Credentials { service } => {
            let orchestrator = orchestrator(&ctx, CancellationToken::new())?;
            let outcome = orchestrator.ensure_credential(&ctx, &service).await?;
            println!(
                "{}: role_id={} (previously {:?}, {})",
                outcome.credential.service_name, outcome.credential.role_id, outcome.prior, outcome.transition
            );
        }
        Commands::TestToken { out, name, groups, days } => {
            let backend = vault_backend(&ctx.config)?;
            let state = backend.status().await.map_err(BootstrapError::from)?;
            if !state.is_ready() {
                return Err(BootstrapError::from(SecretsError::Sealed).into());
            }
            let root_token = ctx
                .store
                .load_root_token()?
                .ok_or_else(|| BootstrapError::MissingUnsealMaterial { path: ctx.store.root_token_path() })?;

            let mut request = TestTokenRequest::new(out);
            request.name = name;
            request.groups = groups;
            request.expires_in = chrono::Duration::days(days);

            let minted = mint_test_token(backend.as_ref(), &root_token, &ctx.config.vault, &request).await?;
            println!("Test token {} written to {}", minted.jti, minted.env_file.display());
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn vault_backend(config: &BootstrapConfig) -> Result<Arc<dyn SecretBackend>, BootstrapError> {
    Ok(Arc::new(VaultHttpBackend::new(&config.vault)?))
}

fn docker_runtime(config: &BootstrapConfig) -> Result<Arc<dyn ContainerRuntime>, BootstrapError> {
    let docker = DockerCli::locate(config.stack.command_timeout(), &config.distribution.helper_image)
        .map_err(|e| BootstrapError::prerequisite(format!("docker CLI ({})", e), DOCKER_INSTALL_HINT))?;
    Ok(Arc::new(docker))
}

fn orchestrator(ctx: &BootstrapContext, cancel: CancellationToken) -> Result<BootstrapOrchestrator, BootstrapError> {
    let backend = vault_backend(&ctx.config)?;
    let runtime = docker_runtime(&ctx.config)?;
    Ok(BootstrapOrchestrator::new(ctx, backend, runtime, cancel))
}

/// Cancel the returned token on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling bootstrap");
            trigger.cancel();
        }
    });
    token
}

fn print_stage_error(error: &StageError) {
    eprintln!();
    eprintln!("{} at stage '{}': {}", "Bootstrap failed".red(), error.stage, error.error);
    eprintln!("  observed: {}", error.observed);
    eprintln!("  remedy:   {}", error.remedy());
    if let BootstrapError::StackUnhealthy(report) = &error.error {
        for (service, logs) in &report.logs {
            eprintln!();
            eprintln!("--- last log lines of {} ---", service);
            eprintln!("{}", logs);
        }
    }
}

/// Map a command failure to the process exit code.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(stage_error) = error.downcast_ref::<StageError>() {
        return stage_error.exit_code();
    }
    if let Some(bootstrap_error) = error.downcast_ref::<BootstrapError>() {
        return bootstrap_error.exit_code();
    }
    1
}
