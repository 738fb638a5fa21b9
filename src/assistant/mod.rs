//! AI grading service
//!
//! - `service`: lifecycle of the grading service and its cache containers
//! - `probe`: readiness checks used while the service starts
//! - `request` / `client`: the evaluation job API (submit, then poll)
//! - `grader`: the `Grader` backend tying the above together

pub mod client;
pub mod grader;
pub mod probe;
pub mod request;
pub mod service;

pub use client::AssistantClient;
pub use grader::AssistantGrader;
pub use request::EvaluationRequest;
pub use service::{GradingService, ServiceHandle, ServiceManager, ServiceState};
