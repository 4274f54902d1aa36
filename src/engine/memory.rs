use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{EngineProperties, INSTANCE_ID_PROPERTY, INSTANCE_NAME_PROPERTY};
use crate::engine::{EngineFactory, EngineMode, SchedulingEngine};
use crate::error::{EngineError, EngineResult};
use crate::job::{JobDetail, JobKey, TriggerKey};
use crate::trigger::Trigger;

pub const DEFAULT_INSTANCE_NAME: &str = "ClusterCronScheduler";

#[derive(Debug)]
struct Registry {
    jobs: BTreeMap<JobKey, JobDetail>,
    triggers: BTreeMap<TriggerKey, Trigger>,
    mode: EngineMode,
}

/// Engine that keeps its registry in memory and does not fire triggers.
///
/// Used to run a node without an external engine and in end-to-end tests.
#[derive(Debug)]
pub struct MemoryEngine {
    instance_name: String,
    instance_id: String,
    registry: Mutex<Registry>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_NAME, Uuid::new_v4().to_string())
    }
}

impl MemoryEngine {
    pub fn new(instance_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            instance_id: instance_id.into(),
            registry: Mutex::new(Registry {
                jobs: BTreeMap::new(),
                triggers: BTreeMap::new(),
                mode: EngineMode::Standby,
            }),
        }
    }

    /// `AUTO` or a missing instance id gets a generated one.
    pub fn from_properties(properties: &EngineProperties) -> Self {
        for (key, value) in properties.iter() {
            tracing::debug!(key, value, "Engine property");
        }
        let instance_name = properties
            .get(INSTANCE_NAME_PROPERTY)
            .unwrap_or(DEFAULT_INSTANCE_NAME);
        let instance_id = match properties.get(INSTANCE_ID_PROPERTY) {
            Some(id) if !id.eq_ignore_ascii_case("AUTO") => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        Self::new(instance_name, instance_id)
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn mode(&self) -> EngineMode {
        self.lock().mode
    }

    pub fn job(&self, key: &JobKey) -> Option<JobDetail> {
        self.lock().jobs.get(key).cloned()
    }

    pub fn trigger(&self, key: &TriggerKey) -> Option<Trigger> {
        self.lock().triggers.get(key).cloned()
    }

    pub fn job_keys(&self) -> Vec<JobKey> {
        self.lock().jobs.keys().cloned().collect()
    }

    pub fn trigger_count(&self) -> usize {
        self.lock().triggers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> EngineResult<MutexGuard<'_, Registry>> {
        let registry = self.lock();
        if registry.mode == EngineMode::Shutdown {
            return Err(EngineError::ShutDown);
        }
        Ok(registry)
    }
}

#[async_trait]
impl SchedulingEngine for MemoryEngine {
    async fn check_job_exists(&self, key: &JobKey) -> EngineResult<bool> {
        Ok(self.open()?.jobs.contains_key(key))
    }

    async fn check_trigger_exists(&self, key: &TriggerKey) -> EngineResult<bool> {
        Ok(self.open()?.triggers.contains_key(key))
    }

    async fn add_job(&self, detail: JobDetail, replace: bool) -> EngineResult<()> {
        let mut registry = self.open()?;
        if !replace && registry.jobs.contains_key(&detail.key) {
            return Err(EngineError::AlreadyExists(detail.key));
        }
        tracing::debug!(instance = %self.instance_name, job = %detail.key, replace, "Stored job");
        registry.jobs.insert(detail.key.clone(), detail);
        Ok(())
    }

    async fn schedule_job(&self, trigger: Trigger) -> EngineResult<()> {
        let mut registry = self.open()?;
        if !registry.jobs.contains_key(&trigger.job_key) {
            return Err(EngineError::JobNotFound(trigger.job_key));
        }
        if registry.triggers.contains_key(&trigger.key) {
            return Err(EngineError::TriggerExists(trigger.key));
        }
        tracing::debug!(
            instance = %self.instance_name,
            trigger = %trigger.key,
            cron = trigger.schedule.expression(),
            "Scheduled trigger"
        );
        registry.triggers.insert(trigger.key.clone(), trigger);
        Ok(())
    }

    async fn reschedule_job(&self, key: &TriggerKey, mut trigger: Trigger) -> EngineResult<()> {
        let mut registry = self.open()?;
        let old = registry
            .triggers
            .remove(key)
            .ok_or_else(|| EngineError::TriggerNotFound(key.clone()))?;
        trigger.job_key = old.job_key;
        registry.triggers.insert(trigger.key.clone(), trigger);
        Ok(())
    }

    async fn unschedule_job(&self, key: &TriggerKey) -> EngineResult<bool> {
        Ok(self.open()?.triggers.remove(key).is_some())
    }

    async fn delete_job(&self, key: &JobKey) -> EngineResult<bool> {
        let mut registry = self.open()?;
        registry.triggers.retain(|_, t| &t.job_key != key);
        Ok(registry.jobs.remove(key).is_some())
    }

    async fn get_trigger(&self, key: &TriggerKey) -> EngineResult<Option<Trigger>> {
        Ok(self.open()?.triggers.get(key).cloned())
    }

    async fn start(&self) -> EngineResult<()> {
        let mut registry = self.open()?;
        if registry.mode != EngineMode::Started {
            registry.mode = EngineMode::Started;
            tracing::info!(instance = %self.instance_name, id = %self.instance_id, "Engine started");
        }
        Ok(())
    }

    async fn standby(&self) -> EngineResult<()> {
        let mut registry = self.open()?;
        if registry.mode != EngineMode::Standby {
            registry.mode = EngineMode::Standby;
            tracing::info!(instance = %self.instance_name, id = %self.instance_id, "Engine in standby");
        }
        Ok(())
    }

    async fn shutdown(&self) -> EngineResult<()> {
        let mut registry = self.lock();
        registry.mode = EngineMode::Shutdown;
        registry.triggers.clear();
        registry.jobs.clear();
        Ok(())
    }
}

/// Builds a fresh [`MemoryEngine`] per activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEngineFactory;

impl EngineFactory for MemoryEngineFactory {
    fn create(&self, properties: &EngineProperties) -> EngineResult<Arc<dyn SchedulingEngine>> {
        Ok(Arc::new(MemoryEngine::from_properties(properties)))
    }
}
