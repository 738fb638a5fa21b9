//! HTTP client for the grading service's job API

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::request::EvaluationRequest;
use crate::core::ValidationError;
use crate::grading::GradeOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

/// Reply of `GET /evaluate/{jobId}`
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub result: Option<GradeOutcome>,
}

pub struct AssistantClient {
    client: Client,
    base_url: String,
}

impl AssistantClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Submit a grading job, returning its id
    pub async fn submit(&self, request: &EvaluationRequest) -> Result<String, ValidationError> {
        let url = format!("{}/evaluate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ValidationError::network(format!("POST {}", url), e))?;

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ValidationError::network(format!("POST {} response", url), e))?;
        info!("Submitted grading job {}", body.job_id);
        Ok(body.job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus, ValidationError> {
        let url = format!("{}/evaluate/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ValidationError::network(format!("GET {}", url), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ValidationError::JobNotFound(job_id.to_string()));
        }

        response
            .error_for_status()
            .map_err(|e| ValidationError::network(format!("GET {}", url), e))?
            .json()
            .await
            .map_err(|e| ValidationError::network(format!("GET {} response", url), e))
    }

    /// Poll `job_id` until it completes, at most `attempts` times.
    ///
    /// The whole poll, requests included, is bounded by `attempts * interval`.
    /// `Ok(None)` if the job completed without a result.
    pub async fn poll(
        &self,
        job_id: &str,
        interval: Duration,
        attempts: u32,
    ) -> Result<Option<GradeOutcome>, ValidationError> {
        let deadline = Instant::now() + interval * attempts;
        let mut polled = 0;

        while polled < attempts {
            polled += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let status = match tokio::time::timeout(remaining, self.status(job_id)).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!("Job {} still unanswered when the poll budget ran out", job_id);
                    break;
                }
            };
            debug!("Job {} attempt {}/{}: {}", job_id, polled, attempts, status.status);
            match status.status.as_str() {
                "completed" => return Ok(status.result),
                "not_found" => return Err(ValidationError::JobNotFound(job_id.to_string())),
                _ => {}
            }
            if polled < attempts {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(interval.min(remaining)).await;
            }
        }

        Err(ValidationError::JobTimeout {
            job_id: job_id.to_string(),
            attempts: polled,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-process stand-in for the grading service

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Job behaviour of the mock service
    #[derive(Clone, Copy, Debug)]
    pub enum Script {
        /// `pending` for n polls, then `completed` with the given points
        CompleteAfter(u32, f64),
        NotFound,
        /// HTTP 404 on the status endpoint
        Missing,
        Pending,
        /// `pending`, answered only after the given delay
        Slow(std::time::Duration),
    }

    #[derive(Clone)]
    struct MockState {
        script: Script,
        polls: Arc<AtomicU32>,
        submitted: Arc<std::sync::Mutex<Vec<Value>>>,
    }

    pub struct MockService {
        pub base_url: String,
        pub polls: Arc<AtomicU32>,
        pub submitted: Arc<std::sync::Mutex<Vec<Value>>>,
    }

    async fn submit(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
        state.submitted.lock().unwrap().push(body);
        Json(json!({ "jobId": "job-1" }))
    }

    async fn status(
        State(state): State<MockState>,
        Path(_id): Path<String>,
    ) -> Result<Json<Value>, StatusCode> {
        let polls = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Script::Slow(delay) = state.script {
            tokio::time::sleep(delay).await;
        }
        let body = match state.script {
            Script::CompleteAfter(n, points) if polls > n => json!({
                "status": "completed",
                "result": { "points": points, "feedback": "looks right" }
            }),
            Script::CompleteAfter(..) | Script::Pending | Script::Slow(_) => {
                json!({ "status": "pending" })
            }
            Script::NotFound => json!({ "status": "not_found" }),
            Script::Missing => return Err(StatusCode::NOT_FOUND),
        };
        Ok(Json(body))
    }

    pub async fn serve(script: Script) -> MockService {
        let state = MockState {
            script,
            polls: Arc::new(AtomicU32::new(0)),
            submitted: Arc::new(std::sync::Mutex::new(Vec::new())),
        };
        let polls = state.polls.clone();
        let submitted = state.submitted.clone();
        let app = Router::new()
            .route("/evaluate", post(submit))
            .route("/evaluate/{id}", get(status))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockService {
            base_url: format!("http://{}", addr),
            polls,
            submitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{serve, Script};
    use super::*;
    use std::sync::atomic::Ordering;

    const FAST: Duration = Duration::from_millis(50);

    fn client(base_url: &str) -> AssistantClient {
        AssistantClient::new(base_url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_poll_until_completed() {
        let service = serve(Script::CompleteAfter(2, 1.0)).await;
        let client = client(&service.base_url);

        let grade = client.poll("job-1", FAST, 20).await.unwrap().unwrap();
        assert_eq!(grade.points, 1.0);
        assert_eq!(grade.feedback, "looks right");
        assert_eq!(service.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let service = serve(Script::NotFound).await;
        let err = client(&service.base_url)
            .poll("job-1", FAST, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::JobNotFound(_)));
        assert_eq!(service.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_404_is_job_not_found() {
        let service = serve(Script::Missing).await;
        let err = client(&service.base_url)
            .status("job-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let service = serve(Script::Pending).await;
        let err = client(&service.base_url)
            .poll("job-1", FAST, 4)
            .await
            .unwrap_err();
        match err {
            ValidationError::JobTimeout { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_slow_status_requests_count_against_budget() {
        let service = serve(Script::Slow(Duration::from_millis(300))).await;
        let started = std::time::Instant::now();

        let err = client(&service.base_url)
            .poll("job-1", Duration::from_millis(20), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, ValidationError::JobTimeout { .. }));
        // budget is 5 * 20ms; allow scheduling slack but not a second request
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(service.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let err = client("http://127.0.0.1:9").status("job-1").await.unwrap_err();
        assert!(matches!(err, ValidationError::NetworkError { .. }));
    }
}
