//! Execution and grading service configuration
//!
//! Defaults are compiled in; environment variables (optionally from a `.env`
//! file) override them. CLI flags override both.

use std::time::Duration;

use anyhow::Context;

/// Sandbox executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Container runtime binary (default: docker)
    pub docker_bin: String,
    /// Wall-clock limit for one evaluator command (default: 60s)
    pub command_timeout: Duration,
    /// Wall-clock limit for the solve step (fixed, 10s)
    pub solve_timeout: Duration,
    /// Numeric user identity passed to the container, if any
    pub user: Option<String>,
    /// Mount point of the workspace inside the container
    pub container_workdir: String,
    /// Limit for the kill issued after a timeout
    pub kill_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            command_timeout: Duration::from_secs(60),
            solve_timeout: Duration::from_secs(10),
            user: None,
            container_workdir: "/workspace".to_string(),
            kill_timeout: Duration::from_secs(10),
        }
    }
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.docker_bin = std::env::var("ACCESS_DOCKER_BIN").unwrap_or(config.docker_bin);
        if let Some(secs) = env_u64("ACCESS_COMMAND_TIMEOUT_SECS") {
            config.command_timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// AI grading service configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Base URL the service is reachable at from the host
    pub base_url: String,
    pub image: String,
    pub cache_image: String,
    pub network: String,
    pub service_container: String,
    pub cache_container: String,
    /// Logical name the service uses to reach its cache
    pub cache_alias: String,
    /// Port published by the service container
    pub port: u16,
    pub api_key: Option<String>,
    /// Overrides the model named in the task's `[llm]` section
    pub model_override: Option<String>,
    /// Leave the service running after grading for later invocations
    pub keep_running: bool,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    pub health_path: String,
    /// Fallback readiness signal in the service's log stream
    pub log_marker: String,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Limit for one docker control command (inspect, start, remove)
    pub docker_timeout: Duration,
    pub pull_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            image: "sealuzh/access-grading-assistant:latest".to_string(),
            cache_image: "redis:7-alpine".to_string(),
            network: "access-assistant-net".to_string(),
            service_container: "access-assistant".to_string(),
            cache_container: "access-assistant-redis".to_string(),
            cache_alias: "redis".to_string(),
            port: 4000,
            api_key: None,
            model_override: None,
            keep_running: false,
            readiness_timeout: Duration::from_secs(30),
            readiness_interval: Duration::from_millis(500),
            health_path: "/health".to_string(),
            log_marker: "Server running on port".to_string(),
            poll_interval: Duration::from_secs(2),
            poll_attempts: 20,
            request_timeout: Duration::from_secs(30),
            docker_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(600),
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.image = std::env::var("ASSISTANT_IMAGE").unwrap_or(config.image);
        config.cache_image = std::env::var("ASSISTANT_CACHE_IMAGE").unwrap_or(config.cache_image);
        config.network = std::env::var("ASSISTANT_NETWORK").unwrap_or(config.network);
        if let Some(port) = env_u64("ASSISTANT_PORT").and_then(|p| u16::try_from(p).ok()) {
            config = config.with_port(port);
        }
        config.api_key = std::env::var("LLM_API_KEY").ok();
        config
    }

    /// Publish the service on `port` and reach it at `localhost:<port>`
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self.base_url = format!("http://localhost:{}", port);
        self
    }

    /// Reach the service at `url`, publishing it on the URL's port
    pub fn with_base_url(mut self, url: &str) -> anyhow::Result<Self> {
        let parsed = reqwest::Url::parse(url)
            .with_context(|| format!("Invalid grading service URL {}", url))?;
        let port = parsed
            .port_or_known_default()
            .with_context(|| format!("No port in grading service URL {}", url))?;
        self.port = port;
        self.base_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// URL of the service's readiness endpoint
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.health_path)
    }

    /// Connection string the service uses to reach its cache
    pub fn cache_url(&self) -> String {
        format!("redis://{}:6379", self.cache_alias)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.readiness_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.poll_attempts, 20);
        assert_eq!(config.cache_url(), "redis://redis:6379");
    }

    #[test]
    fn test_health_url_joins_cleanly() {
        let config = AssistantConfig {
            base_url: "http://127.0.0.1:4000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.health_url(), "http://127.0.0.1:4000/health");
    }

    #[test]
    fn test_port_moves_base_url() {
        let config = AssistantConfig::default().with_port(5000);
        assert_eq!(config.port, 5000);
        assert_eq!(config.health_url(), "http://localhost:5000/health");
    }

    #[test]
    fn test_base_url_sets_published_port() {
        let config = AssistantConfig::default()
            .with_base_url("http://localhost:5000/")
            .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.base_url, "http://localhost:5000");

        let config = AssistantConfig::default()
            .with_base_url("http://grader.local")
            .unwrap();
        assert_eq!(config.port, 80);

        assert!(AssistantConfig::default().with_base_url("not a url").is_err());
    }
}
