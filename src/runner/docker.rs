//! Docker CLI backed container engine
//!
//! Drives an existing docker installation as an external process.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use super::engine::{ContainerEngine, ContainerRun, DetachedContainer};
use super::RunOutcome;

/// Container engine that shells out to `docker`
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn exec(&self, args: &[String]) -> Result<Output> {
        debug!("Running {} with args: {:?}", self.bin, args);
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {} {}", self.bin, args.join(" ")))
    }

    /// Run and fail on a non-zero exit, returning trimmed stdout
    async fn checked(&self, args: &[String]) -> Result<String> {
        let output = self.exec(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} {} failed: {}",
                self.bin,
                args.first().map(String::as_str).unwrap_or(""),
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Arguments for a one-shot `docker run`
pub fn run_args(spec: &ContainerRun) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if spec.network_disabled {
        args.push("--network".to_string());
        args.push("none".to_string());
    }
    args.push("-v".to_string());
    args.push(format!("{}:{}", spec.workspace.display(), spec.workdir));
    args.push("-w".to_string());
    args.push(spec.workdir.clone());
    if let Some(user) = &spec.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }
    args.push(spec.image.clone());
    args.extend(spec.command.to_vec().into_iter().filter(|s| !s.is_empty()));
    args
}

/// Arguments for a detached `docker run -d`
pub fn detached_args(spec: &DetachedContainer) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    if let Some(alias) = &spec.network_alias {
        args.push("--network-alias".to_string());
        args.push(alias.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (host, container) in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}", host, container));
    }
    args.push(spec.image.clone());
    args
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn run(&self, spec: &ContainerRun) -> Result<RunOutcome> {
        let output = self.exec(&run_args(spec)).await?;
        Ok(RunOutcome::from(output))
    }

    async fn kill(&self, name: &str) -> Result<()> {
        let output = self.exec(&strings(&["kill", name])).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // the container may have exited between the timeout and the kill
            if stderr.contains("No such container") || stderr.contains("is not running") {
                debug!("Container {} already gone", name);
                return Ok(());
            }
            anyhow::bail!("docker kill {} failed: {}", name, stderr.trim());
        }
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self.exec(&strings(&["image", "inspect", image])).await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &str) -> Result<()> {
        self.checked(&strings(&["pull", image])).await?;
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.checked(&strings(&["network", "create", name])).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.checked(&strings(&["network", "rm", name])).await?;
        Ok(())
    }

    async fn start_detached(&self, spec: &DetachedContainer) -> Result<String> {
        self.checked(&detached_args(spec)).await
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let output = self
            .exec(&strings(&["inspect", "-f", "{{.State.Running}}", name]))
            .await?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn logs(&self, name: &str) -> Result<String> {
        let output = self.exec(&strings(&["logs", name])).await?;
        let mut log = String::from_utf8_lossy(&output.stdout).to_string();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(log)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.checked(&strings(&["rm", "-f", name])).await?;
        Ok(())
    }
}
