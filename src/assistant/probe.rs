//! Readiness probes for the grading service
//!
//! The structured health endpoint is preferred; the log marker is only
//! consulted when the endpoint does not answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::runner::ContainerEngine;

/// A single readiness check, polled by the lifecycle manager
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self) -> bool;
}

/// Ready once `GET <url>` answers with a 2xx status
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_ready(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health probe {} not answering: {}", self.url, e);
                false
            }
        }
    }
}

/// Ready once the container's log contains a startup marker
pub struct LogMarkerProbe {
    engine: Arc<dyn ContainerEngine>,
    container: String,
    marker: String,
}

impl LogMarkerProbe {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        container: impl Into<String>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            container: container.into(),
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for LogMarkerProbe {
    async fn is_ready(&self) -> bool {
        match self.engine.logs(&self.container).await {
            Ok(log) => log.contains(&self.marker),
            Err(e) => {
                debug!("Cannot read logs of {}: {:#}", self.container, e);
                false
            }
        }
    }
}

/// Ready if the primary probe is, otherwise asks the fallback
pub struct FallbackProbe {
    primary: Box<dyn ReadinessProbe>,
    fallback: Box<dyn ReadinessProbe>,
}

impl FallbackProbe {
    pub fn new(primary: Box<dyn ReadinessProbe>, fallback: Box<dyn ReadinessProbe>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ReadinessProbe for FallbackProbe {
    async fn is_ready(&self) -> bool {
        self.primary.is_ready().await || self.fallback.is_ready().await
    }
}
