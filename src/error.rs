//! Error taxonomy for the screening pipeline.
//!
//! Component errors stay local to the component that raised them; the
//! orchestrator is the only place that turns a `GuardError` into a response
//! (the fail-closed BLOCKED fallback).

use thiserror::Error;

/// Failures of the text classifier or its artifact.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    #[error("classifier model is not loaded: {0}")]
    ModelUnavailable(String),
    #[error("text cannot be empty")]
    EmptyText,
    #[error("invalid model artifact: {0}")]
    Artifact(String),
}

/// Phone numbers the normalizer cannot turn into a lookup key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number contains no digits")]
    NoDigits,
    #[error("phone number has {0} digits, at most 15 are allowed")]
    TooLong(usize),
}

/// Failures while handing a message to the SMS gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("sms delivery failed")]
    Undelivered,
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// Umbrella error for a pipeline step. Never escapes the orchestrator.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("classification failed: {0}")]
    Classification(#[from] ClassifierError),
    #[error("phone validation failed: {0}")]
    Phone(#[from] PhoneError),
    #[error("non-finite {field} ({value}) reached the decision engine")]
    NonFiniteScore { field: &'static str, value: f32 },
    #[error("pipeline task aborted: {0}")]
    Task(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<tokio::task::JoinError> for GuardError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            GuardError::Task("step panicked".to_string())
        } else {
            GuardError::Task(e.to_string())
        }
    }
}
