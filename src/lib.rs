//! Sandboxed execution and grading orchestrator for ACCESS tasks

pub mod assistant;
pub mod config;
pub mod core;
pub mod executor;
pub mod grading;
pub mod runner;
pub mod task;
pub mod validator;
pub mod workspace;
