//! Scheduling engine contract.
//!
//! The engine owns the job/trigger registry and fires triggers while started.
//! The coordinator only drives it through [`SchedulingEngine`]; every node
//! holds exactly one engine instance, shared by CRUD callers, the leadership
//! event loop and lifecycle hooks.
//!
//! Implementations must tolerate concurrent calls and treat `start`,
//! `standby` and `shutdown` as idempotent.
//!
//! - [`memory::MemoryEngine`]: in-process registry without a timer

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineProperties;
use crate::error::EngineResult;
use crate::job::{JobDetail, JobKey, TriggerKey};
use crate::trigger::Trigger;

pub use memory::{MemoryEngine, MemoryEngineFactory};

/// Run mode reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Standby,
    Started,
    Shutdown,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMode::Standby => write!(f, "standby"),
            EngineMode::Started => write!(f, "started"),
            EngineMode::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[async_trait]
pub trait SchedulingEngine: Send + Sync {
    async fn check_job_exists(&self, key: &JobKey) -> EngineResult<bool>;

    async fn check_trigger_exists(&self, key: &TriggerKey) -> EngineResult<bool>;

    /// Store `detail`. Without `replace`, an existing job with the same key is an error.
    async fn add_job(&self, detail: JobDetail, replace: bool) -> EngineResult<()>;

    /// Register a trigger for an already stored job.
    async fn schedule_job(&self, trigger: Trigger) -> EngineResult<()>;

    /// Swap the trigger stored at `key` for `trigger`.
    async fn reschedule_job(&self, key: &TriggerKey, trigger: Trigger) -> EngineResult<()>;

    /// Remove a trigger, keeping its job. Returns whether a trigger was removed.
    async fn unschedule_job(&self, key: &TriggerKey) -> EngineResult<bool>;

    /// Remove a job and its trigger. Returns whether a job was removed.
    async fn delete_job(&self, key: &JobKey) -> EngineResult<bool>;

    async fn get_trigger(&self, key: &TriggerKey) -> EngineResult<Option<Trigger>>;

    /// Begin firing triggers.
    async fn start(&self) -> EngineResult<()>;

    /// Stop firing triggers while keeping the registry loaded.
    async fn standby(&self) -> EngineResult<()>;

    async fn shutdown(&self) -> EngineResult<()>;
}

/// Creates the per-node engine from passthrough properties.
pub trait EngineFactory: Send + Sync {
    fn create(&self, properties: &EngineProperties) -> EngineResult<Arc<dyn SchedulingEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&EngineProperties) -> EngineResult<Arc<dyn SchedulingEngine>> + Send + Sync,
{
    fn create(&self, properties: &EngineProperties) -> EngineResult<Arc<dyn SchedulingEngine>> {
        self(properties)
    }
}
