//! In-memory container engine for tests

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::engine::{ContainerEngine, ContainerRun, DetachedContainer};
use super::RunOutcome;
use crate::grading::GRADE_ARTIFACT;

/// Scriptable engine that records every call as `"<op>:<target>"`
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub exit_code: i32,
    pub stdout: String,
    /// Never finish `run`
    pub hang: bool,
    /// Artifact content written into the workspace by `run`
    pub artifact: Option<String>,
    /// Only write the artifact if this workspace file exists
    pub artifact_requires: Option<String>,
    pub local_images: Vec<String>,
    pub fail_start_of: Option<String>,
    pub fail_remove_of: Option<String>,
    pub log_output: String,
    /// Operations (`"kill"`, `"rm"`) that never answer
    pub stall: Vec<&'static str>,
    pub running: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    async fn maybe_stall(&self, op: &str) {
        if self.stall.iter().any(|s| *s == op) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    fn write_artifact(&self, workspace: &Path) {
        let Some(content) = &self.artifact else {
            return;
        };
        if let Some(required) = &self.artifact_requires {
            if !workspace.join(required).exists() {
                return;
            }
        }
        std::fs::write(workspace.join(GRADE_ARTIFACT), content).unwrap();
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn run(&self, spec: &ContainerRun) -> Result<RunOutcome> {
        self.record(format!("run:{}", spec.name));
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.write_artifact(&spec.workspace);
        Ok(RunOutcome {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.record(format!("kill:{}", name));
        self.maybe_stall("kill").await;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(format!("inspect:{}", image));
        Ok(self.local_images.iter().any(|i| i == image))
    }

    async fn pull(&self, image: &str) -> Result<()> {
        self.record(format!("pull:{}", image));
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.record(format!("network-create:{}", name));
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.record(format!("network-rm:{}", name));
        Ok(())
    }

    async fn start_detached(&self, spec: &DetachedContainer) -> Result<String> {
        self.record(format!("start:{}", spec.name));
        if self.fail_start_of.as_deref() == Some(spec.name.as_str()) {
            anyhow::bail!("cannot start {}", spec.name);
        }
        self.running.lock().unwrap().push(spec.name.clone());
        Ok(format!("id-{}", spec.name))
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.running.lock().unwrap().iter().any(|n| n == name))
    }

    async fn logs(&self, name: &str) -> Result<String> {
        self.record(format!("logs:{}", name));
        Ok(self.log_output.clone())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(format!("rm:{}", name));
        self.maybe_stall("rm").await;
        self.running.lock().unwrap().retain(|n| n != name);
        if self.fail_remove_of.as_deref() == Some(name) {
            anyhow::bail!("cannot remove {}", name);
        }
        Ok(())
    }
}
