//! Grading service lifecycle
//!
//! `Stopped -> Starting -> Ready -> Stopping -> Stopped`, with `Failed`
//! reachable from `Starting` and never left. A start brings up, in order:
//! both images (pulled if absent), a dedicated network, the cache container
//! under a fixed alias, and the service container next to it. Readiness is
//! polled with a bounded deadline; whatever was started is removed again if
//! the service never becomes ready.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::probe::{FallbackProbe, HttpProbe, LogMarkerProbe, ReadinessProbe};
use crate::config::AssistantConfig;
use crate::core::ValidationError;
use crate::runner::{ContainerEngine, DetachedContainer};

/// Running grading service and its cache
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHandle {
    pub service_id: String,
    pub cache_id: String,
    pub network: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Ready(ServiceHandle),
    Stopping,
    Failed(String),
}

/// Something that can bring the grading service up and down
#[async_trait]
pub trait GradingService: Send {
    async fn start(&mut self) -> Result<ServiceHandle, ValidationError>;

    async fn stop(&mut self);
}

/// Manages the grading service containers through a `ContainerEngine`
pub struct ServiceManager {
    engine: Arc<dyn ContainerEngine>,
    config: AssistantConfig,
    probe: Box<dyn ReadinessProbe>,
    state: ServiceState,
}

impl ServiceManager {
    /// Manager probing the health endpoint, falling back to the log marker
    pub fn new(engine: Arc<dyn ContainerEngine>, config: AssistantConfig) -> Self {
        let probe = FallbackProbe::new(
            Box::new(HttpProbe::new(config.health_url(), Duration::from_secs(2))),
            Box::new(LogMarkerProbe::new(
                engine.clone(),
                config.service_container.clone(),
                config.log_marker.clone(),
            )),
        );
        Self::with_probe(engine, config, Box::new(probe))
    }

    pub fn with_probe(
        engine: Arc<dyn ContainerEngine>,
        config: AssistantConfig,
        probe: Box<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            engine,
            config,
            probe,
            state: ServiceState::Stopped,
        }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Remove all service resources, even if keep-running was requested
    pub async fn teardown(&mut self) {
        if !matches!(self.state, ServiceState::Ready(_)) {
            return;
        }
        self.state = ServiceState::Stopping;
        info!("Stopping grading service");
        self.remove_resources(false).await;
        self.state = ServiceState::Stopped;
    }

    /// Forget the running service without touching it (end of a
    /// keep-running session)
    pub fn release(&mut self) {
        if let ServiceState::Ready(handle) = &self.state {
            info!(
                "Leaving grading service {} running at {}",
                handle.service_id, handle.base_url
            );
        }
        self.state = ServiceState::Stopped;
    }

    fn handle(&self, service_id: String, cache_id: String) -> ServiceHandle {
        ServiceHandle {
            service_id,
            cache_id,
            network: self.config.network.clone(),
            base_url: self.config.base_url.clone(),
        }
    }

    /// Run one docker operation, giving up after `limit`
    async fn bounded<T>(
        &self,
        limit: Duration,
        what: String,
        op: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(limit, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{}: {:#}", what, e)),
            Err(_) => Err(format!("{}: no answer after {}s", what, limit.as_secs_f64())),
        }
    }

    async fn launch(&self) -> Result<ServiceHandle, String> {
        let limit = self.config.docker_timeout;
        for image in [&self.config.image, &self.config.cache_image] {
            let present = self
                .bounded(limit, format!("inspecting {}", image), self.engine.image_exists(image))
                .await?;
            if !present {
                info!("Pulling {}", image);
                self.bounded(
                    self.config.pull_timeout,
                    format!("pulling {}", image),
                    self.engine.pull(image),
                )
                .await?;
            }
        }

        // leftovers of an earlier crashed session would clash by name
        self.remove_resources(true).await;

        self.bounded(
            limit,
            format!("creating network {}", self.config.network),
            self.engine.create_network(&self.config.network),
        )
        .await?;

        let cache = DetachedContainer {
            name: self.config.cache_container.clone(),
            image: self.config.cache_image.clone(),
            network: Some(self.config.network.clone()),
            network_alias: Some(self.config.cache_alias.clone()),
            ..Default::default()
        };
        let cache_id = self
            .bounded(limit, "starting cache".to_string(), self.engine.start_detached(&cache))
            .await?;

        let mut env = vec![
            ("REDIS_URL".to_string(), self.config.cache_url()),
            ("PORT".to_string(), self.config.port.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            env.push(("LLM_API_KEY".to_string(), key.clone()));
        }
        if let Some(model) = &self.config.model_override {
            env.push(("LLM_MODEL".to_string(), model.clone()));
        }

        let service = DetachedContainer {
            name: self.config.service_container.clone(),
            image: self.config.image.clone(),
            network: Some(self.config.network.clone()),
            network_alias: None,
            env,
            ports: vec![(self.config.port, self.config.port)],
        };
        let service_id = self
            .bounded(limit, "starting service".to_string(), self.engine.start_detached(&service))
            .await?;
        debug!("Grading service container {}", service_id);

        self.wait_ready().await?;
        Ok(self.handle(service_id, cache_id))
    }

    /// A service left running by a keep-running session, with its cache
    async fn adoptable(&self) -> bool {
        for container in [&self.config.service_container, &self.config.cache_container] {
            let running = self
                .bounded(
                    self.config.docker_timeout,
                    format!("inspecting {}", container),
                    self.engine.is_running(container),
                )
                .await;
            if !running.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    async fn wait_ready(&self) -> Result<(), String> {
        let deadline = Instant::now() + self.config.readiness_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(format!(
                    "not ready after {}s",
                    self.config.readiness_timeout.as_secs_f64()
                ));
            }
            if let Ok(true) = tokio::time::timeout(remaining, self.probe.is_ready()).await {
                info!("Grading service is ready");
                return Ok(());
            }
            tokio::time::sleep(self.config.readiness_interval.min(remaining)).await;
        }
    }

    /// Remove service container, cache container and network, best-effort
    async fn remove_resources(&self, quiet: bool) {
        let limit = self.config.docker_timeout;
        let mut results = Vec::new();
        for container in [&self.config.service_container, &self.config.cache_container] {
            results.push(
                self.bounded(
                    limit,
                    format!("removing container {}", container),
                    self.engine.remove_container(container),
                )
                .await,
            );
        }
        results.push(
            self.bounded(
                limit,
                format!("removing network {}", self.config.network),
                self.engine.remove_network(&self.config.network),
            )
            .await,
        );

        for reason in results.into_iter().filter_map(Result::err) {
            if quiet {
                debug!("Nothing to clean up: {}", reason);
            } else {
                warn!("Cleanup failed: {}", reason);
            }
        }
    }
}

#[async_trait]
impl GradingService for ServiceManager {
    async fn start(&mut self) -> Result<ServiceHandle, ValidationError> {
        match &self.state {
            ServiceState::Ready(handle) => return Ok(handle.clone()),
            ServiceState::Failed(reason) => {
                return Err(ValidationError::ServiceStartFailure(format!(
                    "an earlier start failed: {}",
                    reason
                )))
            }
            _ => {}
        }

        if self.adoptable().await {
            info!(
                "Found running grading service {}, checking readiness",
                self.config.service_container
            );
            match self.wait_ready().await {
                Ok(()) => {
                    let handle = self.handle(
                        self.config.service_container.clone(),
                        self.config.cache_container.clone(),
                    );
                    self.state = ServiceState::Ready(handle.clone());
                    return Ok(handle);
                }
                Err(reason) => warn!("Not reusing grading service: {}", reason),
            }
        }

        info!("Starting grading service from {}", self.config.image);
        self.state = ServiceState::Starting;
        match self.launch().await {
            Ok(handle) => {
                self.state = ServiceState::Ready(handle.clone());
                Ok(handle)
            }
            Err(reason) => {
                error!("Grading service failed to start: {}", reason);
                self.remove_resources(false).await;
                self.state = ServiceState::Failed(reason.clone());
                Err(ValidationError::ServiceStartFailure(reason))
            }
        }
    }

    async fn stop(&mut self) {
        if !matches!(self.state, ServiceState::Ready(_)) {
            return;
        }
        if self.config.keep_running {
            debug!("Keep-running requested, leaving grading service up");
            return;
        }
        self.teardown().await;
    }
}
