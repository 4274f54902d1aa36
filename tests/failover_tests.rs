
use std::sync::Arc;
use std::time::Duration;

use cluster_cron::bootstrap::ScriptBootstrap;
use cluster_cron::config::{EngineProperties, SchedulerConfig, INSTANCE_ID_PROPERTY};
use cluster_cron::engine::{EngineFactory, EngineMode, MemoryEngine, SchedulingEngine};
use cluster_cron::error::EngineResult;
use cluster_cron::job::{JobDefinition, JobKey};
use cluster_cron::leadership::{leadership_path, LocalElection};
use cluster_cron::{JobScheduler, SchedulerMode};
use test_harness::{job, CRON};

struct Node {
    scheduler: JobScheduler,
    engine: Arc<MemoryEngine>,
}

fn start_node(election: &LocalElection, node_id: u64, resource_dir: &std::path::Path) -> Node {
    let engine = Arc::new(MemoryEngine::new("test", format!("node-{}", node_id)));
    let handed_out = engine.clone();
    let factory: Arc<dyn EngineFactory> = Arc::new(
        move |_: &EngineProperties| -> EngineResult<Arc<dyn SchedulingEngine>> {
            Ok(handed_out.clone() as Arc<dyn SchedulingEngine>)
        },
    );
    let scheduler = JobScheduler::new(
        factory,
        Arc::new(election.node(node_id)),
        Arc::new(ScriptBootstrap::new(resource_dir)),
    );
    Node { scheduler, engine }
}

async fn wait_for_mode(scheduler: &JobScheduler, mode: SchedulerMode) {
    let mut modes = scheduler.subscribe_mode();
    tokio::time::timeout(Duration::from_secs(2), modes.wait_for(|m| *m == mode))
        .await
        .unwrap_or_else(|_| panic!("scheduler did not reach {mode}"))
        .expect("mode channel open");
}

#[tokio::test]
async fn test_add_job_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let election = LocalElection::new(true);
    let node = start_node(&election, 1, dir.path());
    node.scheduler
        .activate(&SchedulerConfig::new("e2e"))
        .await
        .unwrap();

    node.scheduler
        .add_job(&job("j1", "g1", CRON, true))
        .await
        .expect("add should succeed");

    let key = JobKey::new("j1", "g1");
    assert!(node.engine.job(&key).is_some());
    let trigger = node.engine.trigger(&key.trigger_key()).expect("trigger stored");
    assert_eq!(trigger.schedule.expression(), CRON);
    assert_eq!(node.engine.trigger_count(), 1);
}

#[tokio::test]
async fn test_job_lifecycle_against_memory_engine() {
    let dir = tempfile::tempdir().unwrap();
    let election = LocalElection::new(true);
    let node = start_node(&election, 1, dir.path());
    node.scheduler
        .activate(&SchedulerConfig::new("e2e"))
        .await
        .unwrap();
    let key = JobKey::new("nightly", "reports");

    // Adding twice leaves a single registration.
    node.scheduler
        .add_job(&job("nightly", "reports", "0 0 1 * * ?", true))
        .await
        .unwrap();
    node.scheduler
        .add_job(&job("nightly", "reports", "0 0 1 * * ?", true))
        .await
        .unwrap();
    assert_eq!(node.engine.job_keys(), vec![key.clone()]);

    // Deactivating keeps the job but drops its trigger.
    node.scheduler
        .update_job(&job("nightly", "reports", "0 0 1 * * ?", false))
        .await
        .unwrap();
    assert!(node.engine.job(&key).is_some());
    assert!(node.engine.trigger(&key.trigger_key()).is_none());

    // Reactivating creates a fresh trigger with the new rule.
    node.scheduler
        .update_job(&job("nightly", "reports", "0 30 2 * * ?", true))
        .await
        .unwrap();
    let trigger = node.engine.trigger(&key.trigger_key()).unwrap();
    assert_eq!(trigger.schedule.expression(), "0 30 2 * * ?");

    // A further change reschedules in place.
    node.scheduler
        .update_job(&job("nightly", "reports", "0 0 3 * * ?", true))
        .await
        .unwrap();
    assert_eq!(node.engine.trigger_count(), 1);
    assert_eq!(
        node.engine
            .trigger(&key.trigger_key())
            .unwrap()
            .schedule
            .expression(),
        "0 0 3 * * ?"
    );

    node.scheduler
        .delete_job(&JobDefinition::key_only(key.clone()))
        .await
        .unwrap();
    assert!(node.engine.job_keys().is_empty());
    assert_eq!(node.engine.trigger_count(), 0);
}

#[tokio::test]
async fn test_only_first_node_runs() {
    let dir = tempfile::tempdir().unwrap();
    let election = LocalElection::new(true);
    let config = SchedulerConfig::new("cluster");
    let first = start_node(&election, 1, dir.path());
    let second = start_node(&election, 2, dir.path());

    first.scheduler.activate(&config).await.unwrap();
    second.scheduler.activate(&config).await.unwrap();

    assert_eq!(first.scheduler.mode(), SchedulerMode::Running);
    assert_eq!(second.scheduler.mode(), SchedulerMode::Standby);
    assert_eq!(first.engine.mode(), EngineMode::Started);
    assert_eq!(second.engine.mode(), EngineMode::Standby);
    assert_eq!(election.leader(&leadership_path("cluster")), Some(1));
}

#[tokio::test]
async fn test_standby_node_takes_over_when_leader_resigns() {
    let dir = tempfile::tempdir().unwrap();
    let election = LocalElection::new(true);
    let config = SchedulerConfig::new("cluster");
    let path = leadership_path("cluster");
    let first = start_node(&election, 1, dir.path());
    let second = start_node(&election, 2, dir.path());
    first.scheduler.activate(&config).await.unwrap();
    second.scheduler.activate(&config).await.unwrap();

    // Every node keeps the same registry.
    for node in [&first, &second] {
        node.scheduler
            .add_job(&job("sync", "etl", CRON, true))
            .await
            .unwrap();
    }

    election.resign(&path, 1).unwrap();

    wait_for_mode(&first.scheduler, SchedulerMode::Standby).await;
    wait_for_mode(&second.scheduler, SchedulerMode::Running).await;
    assert_eq!(first.engine.mode(), EngineMode::Standby);
    assert_eq!(second.engine.mode(), EngineMode::Started);
    assert!(second
        .engine
        .trigger(&JobKey::new("sync", "etl").trigger_key())
        .is_some());

    // And back again.
    election.elect(&path, 1).unwrap();
    wait_for_mode(&first.scheduler, SchedulerMode::Running).await;
    wait_for_mode(&second.scheduler, SchedulerMode::Standby).await;
}

#[tokio::test]
async fn test_deactivated_leader_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let election = LocalElection::new(true);
    let node = start_node(&election, 1, dir.path());
    node.scheduler
        .activate(&SchedulerConfig::new("cluster"))
        .await
        .unwrap();

    node.scheduler.deactivate().await;
    // Leadership changes after shutdown reach no engine.
    election.resign(&leadership_path("cluster"), 1).unwrap();

    assert_eq!(node.engine.mode(), EngineMode::Shutdown);
    assert_eq!(node.scheduler.mode(), SchedulerMode::Shutdown);
}

#[tokio::test]
async fn test_activation_with_default_engine_factory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(cluster_cron::config::DEFAULT_INIT_SCRIPT),
        "CREATE TABLE IF NOT EXISTS QRTZ_LOCKS(ID INT);",
    )
    .unwrap();
    let election = LocalElection::new(true);
    let scheduler = JobScheduler::new(
        Arc::new(cluster_cron::engine::MemoryEngineFactory),
        Arc::new(election.node(1)),
        Arc::new(ScriptBootstrap::new(dir.path())),
    );
    let config = SchedulerConfig::new("default-factory")
        .with_engine_property(INSTANCE_ID_PROPERTY, "AUTO");

    scheduler.activate(&config).await.unwrap();
    scheduler
        .add_job(&job("j1", "g1", CRON, true))
        .await
        .unwrap();

    assert_eq!(scheduler.mode(), SchedulerMode::Running);
    scheduler.deactivate().await;
}
