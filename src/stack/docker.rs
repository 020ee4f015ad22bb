//! [`ContainerRuntime`] backed by the `docker` CLI.
//!
//! Every invocation runs under `tokio::time::timeout` with `kill_on_drop`, so
//! a hung engine call is killed rather than blocking the pipeline.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::runtime::{
    BuildSpec, ComposeProject, ContainerRuntime, ContainerState, FileOwnership, RuntimeError,
    RuntimeResult,
};

pub const DOCKER_INSTALL_HINT: &str = "Install Docker: https://docs.docker.com/get-docker/";

#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    command_timeout: Duration,
    helper_image: String,
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

impl DockerCli {
    /// Locate the `docker` binary on `PATH`.
    pub fn locate(command_timeout: Duration, helper_image: impl Into<String>) -> RuntimeResult<Self> {
        let binary = which::which("docker").map_err(|e| {
            RuntimeError::engine_unavailable(format!("docker CLI not found on PATH: {}", e))
        })?;
        Ok(Self::with_binary(binary, command_timeout, helper_image))
    }

    pub fn with_binary(
        binary: impl Into<PathBuf>,
        command_timeout: Duration,
        helper_image: impl Into<String>,
    ) -> Self {
        Self { binary: binary.into(), command_timeout, helper_image: helper_image.into() }
    }

    async fn execute(&self, args: &[&str], env: &[(String, String)]) -> RuntimeResult<CommandOutput> {
        let rendered = format!("docker {}", args.join(" "));
        let mut command = Command::new(&self.binary);
        command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        command.kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        tracing::debug!(command = %rendered, "Running engine command");
        let output = match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RuntimeError::Timeout {
                    command: rendered,
                    duration_ms: self.command_timeout.as_millis() as u64,
                })
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run(&self, args: &[&str]) -> RuntimeResult<String> {
        self.run_with_env(args, &[]).await
    }

    async fn run_with_env(&self, args: &[&str], env: &[(String, String)]) -> RuntimeResult<String> {
        let output = self.execute(args, env).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(RuntimeError::command_failed(
                format!("docker {}", args.join(" ")),
                output.stderr.trim().to_string(),
            ))
        }
    }

    /// Run an inspect-style command; a "no such object" failure means absent.
    async fn exists(&self, args: &[&str]) -> RuntimeResult<bool> {
        let output = self.execute(args, &[]).await?;
        if output.success {
            return Ok(true);
        }
        if is_not_found(&output.stderr) {
            return Ok(false);
        }
        Err(RuntimeError::command_failed(format!("docker {}", args.join(" ")), output.stderr.trim()))
    }

    fn compose_args<'a>(project: &'a ComposeProject, file: &'a str) -> Vec<&'a str> {
        vec!["compose", "-p", project.name.as_str(), "-f", file]
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lowered = stderr.to_ascii_lowercase();
    lowered.contains("no such") || lowered.contains("not found")
}

pub(crate) fn parse_state(name: &str, json: &str) -> RuntimeResult<ContainerState> {
    let state: InspectState = serde_json::from_str(json.trim()).map_err(|e| RuntimeError::Parse {
        command: format!("docker inspect {}", name),
        message: e.to_string(),
    })?;
    Ok(ContainerState {
        name: name.to_string(),
        status: state.status,
        health: state.health.map(|h| h.status),
        exit_code: state.exit_code,
    })
}

/// Shell run by the helper container to swap a volume's contents.
pub(crate) fn replace_script(ownership: &FileOwnership) -> String {
    format!(
        "find /target -mindepth 1 -delete && cp -R /staging/. /target/ && \
         chown -R {uid}:{gid} /target && \
         find /target -type d -exec chmod {dir:o} {{}} + && \
         find /target -type f -exec chmod {file:o} {{}} +",
        uid = ownership.uid,
        gid = ownership.gid,
        dir = ownership.dir_mode,
        file = ownership.file_mode,
    )
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn engine_version(&self) -> RuntimeResult<String> {
        let output = self.execute(&["version", "--format", "{{.Server.Version}}"], &[]).await?;
        if output.success {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(RuntimeError::engine_unavailable(output.stderr.trim()))
        }
    }

    async fn image_exists(&self, tag: &str) -> RuntimeResult<bool> {
        self.exists(&["image", "inspect", tag]).await
    }

    async fn build_image(&self, tag: &str, spec: &BuildSpec) -> RuntimeResult<()> {
        let dockerfile = spec.dockerfile.to_string_lossy();
        let context = spec.context.to_string_lossy();
        self.run(&["build", "-t", tag, "-f", &dockerfile, &context]).await?;
        tracing::info!(tag = %tag, "Image built");
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> RuntimeResult<bool> {
        self.exists(&["network", "inspect", name]).await
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<()> {
        self.run(&["network", "create", name]).await.map(|_| ())
    }

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool> {
        self.exists(&["volume", "inspect", name]).await
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<()> {
        self.run(&["volume", "create", name]).await.map(|_| ())
    }

    async fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        self.run(&["volume", "rm", name]).await.map(|_| ())
    }

    async fn start_service(&self, project: &ComposeProject, service: &str) -> RuntimeResult<()> {
        let file = project.compose_file.to_string_lossy();
        let mut args = Self::compose_args(project, &file);
        args.extend(["up", "-d", "--no-deps", "--force-recreate", service]);
        self.run_with_env(&args, &project.env).await.map(|_| ())
    }

    async fn stop_project(&self, project: &ComposeProject) -> RuntimeResult<()> {
        let file = project.compose_file.to_string_lossy();
        let mut args = Self::compose_args(project, &file);
        args.extend(["down", "--remove-orphans"]);
        self.run_with_env(&args, &project.env).await.map(|_| ())
    }

    async fn inspect_container(&self, name: &str) -> RuntimeResult<Option<ContainerState>> {
        let output = self.execute(&["inspect", "--format", "{{json .State}}", name], &[]).await?;
        if !output.success {
            if is_not_found(&output.stderr) {
                return Ok(None);
            }
            return Err(RuntimeError::command_failed(format!("docker inspect {}", name), output.stderr.trim()));
        }
        parse_state(name, &output.stdout).map(Some)
    }

    async fn container_logs(&self, name: &str, tail: u32) -> RuntimeResult<String> {
        let tail = tail.to_string();
        let output = self.execute(&["logs", "--tail", &tail, name], &[]).await?;
        if !output.success {
            return Err(RuntimeError::command_failed(format!("docker logs {}", name), output.stderr.trim()));
        }
        // Containers log to both streams
        Ok(format!("{}{}", output.stdout, output.stderr))
    }

    async fn exec(&self, container: &str, command: &[&str]) -> RuntimeResult<String> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.run(&args).await
    }

    async fn replace_volume_contents(
        &self,
        volume: &str,
        source: &Path,
        ownership: &FileOwnership,
    ) -> RuntimeResult<()> {
        let staging_mount = format!("{}:/staging:ro", source.display());
        let target_mount = format!("{}:/target", volume);
        let script = replace_script(ownership);
        self.run(&[
            "run",
            "--rm",
            "-v",
            &staging_mount,
            "-v",
            &target_mount,
            &self.helper_image,
            "sh",
            "-c",
            &script,
        ])
        .await?;
        Ok(())
    }

    async fn clear_volume(&self, volume: &str) -> RuntimeResult<()> {
        let target_mount = format!("{}:/target", volume);
        self.run(&[
            "run",
            "--rm",
            "-v",
            &target_mount,
            &self.helper_image,
            "sh",
            "-c",
            "find /target -mindepth 1 -delete",
        ])
        .await?;
        Ok(())
    }
}
