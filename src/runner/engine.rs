//! Container runtime seam

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use super::{CommandSpec, RunOutcome};

/// One-shot, network-isolated container run against a workspace
#[derive(Debug, Clone)]
pub struct ContainerRun {
    /// Handle assigned before the container starts; used to kill it
    pub name: String,
    pub image: String,
    pub command: CommandSpec,
    /// Host directory bind-mounted as the working directory
    pub workspace: PathBuf,
    pub workdir: String,
    pub user: Option<String>,
    pub network_disabled: bool,
}

/// Long-running container started in the background
#[derive(Debug, Clone, Default)]
pub struct DetachedContainer {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    /// Name other containers on `network` reach this one by
    pub network_alias: Option<String>,
    pub env: Vec<(String, String)>,
    /// (host, container) port pairs
    pub ports: Vec<(u16, u16)>,
}

/// Container runtime operations used by the executor and the grading
/// service lifecycle manager.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Run a container to completion.
    ///
    /// Dropping the returned future stops waiting but does not stop the
    /// container; callers kill it through `ContainerRun::name`.
    async fn run(&self, spec: &ContainerRun) -> Result<RunOutcome>;

    /// Force-stop a container by name or id
    async fn kill(&self, name: &str) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull(&self, image: &str) -> Result<()>;

    async fn create_network(&self, name: &str) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Start a detached container and return its id
    async fn start_detached(&self, spec: &DetachedContainer) -> Result<String>;

    async fn is_running(&self, name: &str) -> Result<bool>;

    /// Combined stdout/stderr log of a container so far
    async fn logs(&self, name: &str) -> Result<String>;

    /// Remove a container, stopping it first if needed
    async fn remove_container(&self, name: &str) -> Result<()>;
}
