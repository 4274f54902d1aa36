use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::SchemaBootstrap;
use crate::config::SchedulerConfig;
use crate::engine::{EngineFactory, SchedulingEngine};
use crate::error::{Result, SchedulerError};
use crate::job::{JobDetail, JobKey, ScheduledJob};
use crate::leadership::{CoordinationService, LeadershipChannel, LeadershipEvent, LeadershipRegistrar};
use crate::trigger::{CronSchedule, Trigger};

/// Lifecycle of a node's scheduler.
///
/// `Uninitialized -> Standby -> Running <-> Standby -> Shutdown`. After
/// activation only leadership events move between `Running` and `Standby`;
/// `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Uninitialized,
    Standby,
    Running,
    Shutdown,
}

impl std::fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerMode::Uninitialized => write!(f, "uninitialized"),
            SchedulerMode::Standby => write!(f, "standby"),
            SchedulerMode::Running => write!(f, "running"),
            SchedulerMode::Shutdown => write!(f, "shutdown"),
        }
    }
}

struct Activation {
    engine: Arc<dyn SchedulingEngine>,
    cancel: CancellationToken,
    events_task: JoinHandle<()>,
}

/// Leadership-aware owner of the node's scheduling engine.
///
/// Every node registers the same jobs; only the node holding leadership at
/// the scheduler's path keeps its engine running, the others stay in standby
/// and take over on promotion.
///
/// Job operations are check-then-act against the engine and are not atomic
/// with respect to each other. Callers are expected to serialize them.
pub struct JobScheduler {
    engine_factory: Arc<dyn EngineFactory>,
    coordination: Arc<dyn CoordinationService>,
    bootstrap: Arc<dyn SchemaBootstrap>,
    registrar: LeadershipRegistrar,
    activation: RwLock<Option<Activation>>,
    mode_tx: Arc<watch::Sender<SchedulerMode>>,
}

impl JobScheduler {
    pub fn new(
        engine_factory: Arc<dyn EngineFactory>,
        coordination: Arc<dyn CoordinationService>,
        bootstrap: Arc<dyn SchemaBootstrap>,
    ) -> Self {
        let (mode_tx, _) = watch::channel(SchedulerMode::Uninitialized);
        Self {
            registrar: LeadershipRegistrar::new(coordination.clone()),
            engine_factory,
            coordination,
            bootstrap,
            activation: RwLock::new(None),
            mode_tx: Arc::new(mode_tx),
        }
    }

    pub fn mode(&self) -> SchedulerMode {
        *self.mode_tx.borrow()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<SchedulerMode> {
        self.mode_tx.subscribe()
    }

    /// Path registered at activation, if activation got that far.
    pub fn leadership_path(&self) -> Option<&str> {
        self.registrar.leadership_path()
    }

    /// Bring the engine up in the mode matching this node's leadership.
    ///
    /// 1. Creates the engine from the passthrough properties
    /// 2. Bootstraps the store (failures are logged only)
    /// 3. Registers the leadership path and subscribes to leadership changes
    /// 4. Starts the engine if this node already leads (start failures are logged only)
    ///
    /// # Errors
    ///
    /// Fails if the scheduler is not `Uninitialized`, if the engine cannot be
    /// created, or if the coordination service rejects registration, the
    /// subscription or the leadership query. The scheduler is left
    /// `Uninitialized` in the latter cases.
    pub async fn activate(&self, config: &SchedulerConfig) -> Result<()> {
        let mut activation = self.activation.write().await;
        let mode = self.mode();
        if mode != SchedulerMode::Uninitialized {
            return Err(SchedulerError::InvalidState(mode));
        }

        let engine = self.engine_factory.create(&config.engine_properties)?;
        self.mode_tx.send_replace(SchedulerMode::Standby);

        if let Err(e) = self
            .bootstrap
            .ensure_schema(config.init_script.as_deref())
            .await
        {
            tracing::warn!(error = %e, "Store bootstrap failed, continuing activation");
        }

        let (channel, events) = LeadershipChannel::new();
        if let Err(e) = self.join_election(&config.layer, engine.as_ref(), channel).await {
            if let Err(shutdown_err) = engine.shutdown().await {
                tracing::warn!(error = %shutdown_err, "Failed to shut down engine after aborted activation");
            }
            self.mode_tx.send_replace(SchedulerMode::Uninitialized);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let events_task = tokio::spawn(Self::leadership_loop(
            engine.clone(),
            events,
            cancel.clone(),
            self.mode_tx.clone(),
        ));

        *activation = Some(Activation {
            engine,
            cancel,
            events_task,
        });
        tracing::info!(layer = %config.layer, mode = %self.mode(), "Job scheduler activated");
        Ok(())
    }

    async fn join_election(
        &self,
        layer: &str,
        engine: &dyn SchedulingEngine,
        channel: LeadershipChannel,
    ) -> Result<()> {
        let path = self.registrar.register(layer).await?;

        // Subscribe before querying so a change racing the query is queued.
        self.coordination
            .add_listener(Arc::new(channel), &path)
            .await?;

        if self.coordination.is_leader(&path).await? {
            match engine.start().await {
                Ok(()) => {
                    self.mode_tx.send_replace(SchedulerMode::Running);
                    tracing::info!(path = %path, "Node leads the scheduler, engine started");
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "Failed to start engine"),
            }
        } else {
            tracing::info!(path = %path, "Node does not lead the scheduler, engine in standby");
        }
        Ok(())
    }

    /// Apply leadership events one at a time until cancelled.
    async fn leadership_loop(
        engine: Arc<dyn SchedulingEngine>,
        mut events: mpsc::UnboundedReceiver<LeadershipEvent>,
        cancel: CancellationToken,
        mode_tx: Arc<watch::Sender<SchedulerMode>>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = events.recv() => {
                    let Some(event) = event else { break };
                    Self::apply_leadership_event(engine.as_ref(), event, &mode_tx).await;
                }
            }
        }
        tracing::debug!("Leadership event loop stopped");
    }

    async fn apply_leadership_event(
        engine: &dyn SchedulingEngine,
        event: LeadershipEvent,
        mode_tx: &watch::Sender<SchedulerMode>,
    ) {
        let (result, mode) = match event {
            LeadershipEvent::Promoted => (engine.start().await, SchedulerMode::Running),
            LeadershipEvent::Demoted => (engine.standby().await, SchedulerMode::Standby),
        };
        match result {
            Ok(()) => {
                mode_tx.send_replace(mode);
                tracing::info!(event = %event, mode = %mode, "Scheduler mode changed");
            }
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Failed to apply leadership change");
            }
        }
    }

    /// Stop the leadership loop and shut the engine down.
    ///
    /// Never fails; engine errors are logged. Safe to call more than once.
    pub async fn deactivate(&self) {
        let activation = self.activation.write().await.take();
        if let Some(activation) = activation {
            activation.cancel.cancel();
            if let Err(e) = activation.events_task.await {
                tracing::warn!(error = %e, "Leadership event loop ended abnormally");
            }
            if let Err(e) = activation.engine.shutdown().await {
                tracing::warn!(error = %e, "Engine shutdown failed");
            }
            tracing::info!("Job scheduler deactivated");
        }
        self.mode_tx.send_replace(SchedulerMode::Shutdown);
    }

    async fn engine(&self) -> Result<Arc<dyn SchedulingEngine>> {
        match self.activation.read().await.as_ref() {
            Some(activation) => Ok(activation.engine.clone()),
            None => Err(SchedulerError::InvalidState(self.mode())),
        }
    }

    /// Register a job and its trigger. A job whose key is already registered
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// `InvalidJob` without a job detail, `InvalidCronExpression` for an
    /// unparsable rule, `Engine` for any engine failure.
    pub async fn add_job<J: ScheduledJob + ?Sized>(&self, job: &J) -> Result<()> {
        let (key, detail) = job_identity(job)?;
        let engine = self.engine().await?;

        if engine.check_job_exists(key).await? {
            tracing::debug!(job = %key, "Job already registered, nothing to add");
            return Ok(());
        }

        let schedule = CronSchedule::parse(job.cron_expression())?;
        let trigger = new_trigger(key, detail, schedule);
        engine.add_job(detail.clone(), false).await?;
        engine.schedule_job(trigger).await?;
        tracing::info!(job = %key, cron = job.cron_expression(), "Job added");
        Ok(())
    }

    /// Refresh a registered job and bring its trigger in line with the
    /// job's `active` flag. Unknown jobs are ignored.
    ///
    /// The stored detail is refreshed first. An existing trigger keeps its
    /// identity and is rescheduled; an inactive job loses its trigger but
    /// stays registered.
    pub async fn update_job<J: ScheduledJob + ?Sized>(&self, job: &J) -> Result<()> {
        let (key, detail) = job_identity(job)?;
        let engine = self.engine().await?;

        if !engine.check_job_exists(key).await? {
            tracing::debug!(job = %key, "Job not registered, nothing to update");
            return Ok(());
        }

        engine.add_job(detail.clone(), true).await?;

        let trigger_key = key.trigger_key();
        if job.is_active() {
            let schedule = CronSchedule::parse(job.cron_expression())?;
            match engine.get_trigger(&trigger_key).await? {
                Some(existing) => {
                    let replacement = existing.trigger_builder().build(schedule);
                    engine.reschedule_job(&trigger_key, replacement).await?;
                    tracing::info!(job = %key, cron = job.cron_expression(), "Job rescheduled");
                }
                None => {
                    engine
                        .schedule_job(new_trigger(key, detail, schedule))
                        .await?;
                    tracing::info!(job = %key, cron = job.cron_expression(), "Job scheduled");
                }
            }
        } else if engine.check_trigger_exists(&trigger_key).await? {
            engine.unschedule_job(&trigger_key).await?;
            tracing::info!(job = %key, "Job deactivated, trigger removed");
        }
        Ok(())
    }

    /// Remove a job together with its trigger. Unknown jobs are ignored.
    pub async fn delete_job<J: ScheduledJob + ?Sized>(&self, job: &J) -> Result<()> {
        let key = job
            .job_key()
            .or_else(|| job.job_detail().map(|d| &d.key))
            .ok_or_else(|| SchedulerError::InvalidJob("job key is missing".to_string()))?;
        let engine = self.engine().await?;

        if engine.check_job_exists(key).await? {
            engine.delete_job(key).await?;
            tracing::info!(job = %key, "Job deleted");
        } else {
            tracing::debug!(job = %key, "Job not registered, nothing to delete");
        }
        Ok(())
    }
}

/// Fresh trigger for `key`, described like the job it fires.
fn new_trigger(key: &JobKey, detail: &JobDetail, schedule: CronSchedule) -> Trigger {
    let builder = Trigger::builder(key);
    match &detail.description {
        Some(description) => builder.with_description(description.clone()),
        None => builder,
    }
    .build(schedule)
}

/// Key and detail of a job about to be stored.
fn job_identity<J: ScheduledJob + ?Sized>(job: &J) -> Result<(&JobKey, &JobDetail)> {
    let detail = job
        .job_detail()
        .ok_or_else(|| SchedulerError::InvalidJob("job detail is missing".to_string()))?;
    match job.job_key() {
        Some(key) if key != &detail.key => Err(SchedulerError::InvalidJob(format!(
            "job key {} does not match detail key {}",
            key, detail.key
        ))),
        Some(key) => Ok((key, detail)),
        None => Ok((&detail.key, detail)),
    }
}
