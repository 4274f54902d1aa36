use thiserror::Error;

use crate::coordinator::SchedulerMode;
use crate::job::{JobKey, TriggerKey};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid cron expression {expression:?}: {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Scheduling engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Coordination service error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Scheduler is {0}")]
    InvalidState(SchedulerMode),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure reported by a scheduling engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Job already exists: {0}")]
    AlreadyExists(JobKey),

    #[error("Job not found: {0}")]
    JobNotFound(JobKey),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(TriggerKey),

    #[error("Trigger already exists: {0}")]
    TriggerExists(TriggerKey),

    #[error("Engine has been shut down")]
    ShutDown,

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        EngineError::Other {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        EngineError::Other {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Leadership path not registered: {0}")]
    UnknownPath(String),

    #[error("Coordination service unavailable: {0}")]
    Unavailable(String),
}

/// Store bootstrap failures. These are logged at activation and never propagated.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to read init script {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to apply init script: {0}")]
    Apply(String),
}
