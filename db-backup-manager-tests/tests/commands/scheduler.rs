//! Tests for the daily scheduler and its manual trigger

use chrono::Timelike;
use db_backup_manager::managers::scheduler::TriggerOutcome;
use db_backup_manager::strategies::{EngineGenerator, GenerateRequest, StrategyFactory};
use db_backup_manager::utils::locker::RunLock;
use db_backup_manager::{
    BackupError, BackupOrchestrator, Config, DatabaseConfig, Scheduler, SchedulerHandle,
    SchedulerState,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    mysql_dump_output, secrets_for, ConfigBuilder, ManualTriggerPolicy, MockExecutor, MockResponse,
    TestContext,
};
use tokio::task::JoinHandle;

/// Generator that takes a while and counts its runs
struct SlowGenerator {
    runs: Arc<AtomicUsize>,
}

impl EngineGenerator for SlowGenerator {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn write_artifact(
        &self,
        _config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<PathBuf, BackupError> {
        std::thread::sleep(Duration::from_millis(300));
        let path = request.output_path();
        std::fs::write(&path, "-- slow").map_err(|e| BackupError::io("write", e))?;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }
}

fn start(config: Config, executor: MockExecutor) -> (Arc<BackupOrchestrator>, SchedulerHandle, JoinHandle<()>) {
    start_with(config, StrategyFactory::with_defaults(Arc::new(executor)))
}

/// Start a scheduler whose daily slot is twelve hours away
fn start_with(mut config: Config, factory: StrategyFactory) -> (Arc<BackupOrchestrator>, SchedulerHandle, JoinHandle<()>) {
    let hour = (chrono::Local::now().hour() + 12) % 24;
    config.backup_settings.schedule_time = format!("{:02}:00", hour).parse().unwrap();

    let orchestrator = Arc::new(BackupOrchestrator::new(factory, Arc::new(secrets_for(&["shop"]))));
    let (scheduler, handle) = Scheduler::new(Arc::clone(&orchestrator), config);
    let task = tokio::spawn(scheduler.with_poll_interval(Duration::from_millis(50)).run());
    (orchestrator, handle, task)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_run_now_triggers_cycle() {
    let ctx = TestContext::with_minimal_config();
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::stdout(mysql_dump_output()));
    let (orchestrator, handle, task) = start(ctx.config().unwrap().clone(), executor);

    wait_for(|| matches!(handle.state(), SchedulerState::Waiting { .. })).await;
    assert!(orchestrator.get_stats().next_scheduled_run.is_some());

    assert_eq!(handle.run_now(), TriggerOutcome::Accepted);
    wait_for(|| orchestrator.get_stats().last_run.is_some()).await;
    assert_eq!(ctx.artifacts().len(), 1);

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(handle.state(), SchedulerState::Idle);
    assert!(orchestrator.get_stats().next_scheduled_run.is_none());
    assert_eq!(handle.run_now(), TriggerOutcome::Stopped);
}

#[tokio::test]
async fn test_locked_directory_skips_slot() {
    let ctx = TestContext::with_minimal_config();
    let _held = RunLock::try_acquire(&ctx.backup_dir()).unwrap().unwrap();
    let executor = MockExecutor::new().with_default_response(MockResponse::stdout(mysql_dump_output()));
    let calls = executor.calls.clone();
    let (orchestrator, handle, task) = start(ctx.config().unwrap().clone(), executor);

    wait_for(|| matches!(handle.state(), SchedulerState::Waiting { .. })).await;
    handle.run_now();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // the scheduler survives and waits for the next slot
    assert!(matches!(handle.state(), SchedulerState::Waiting { .. }));
    assert!(calls.lock().is_empty());
    assert!(orchestrator.get_stats().last_run.is_none());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_before_first_slot() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_retention(3));
    let (_orchestrator, handle, task) = start(ctx.config().unwrap().clone(), MockExecutor::new());

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert!(ctx.artifacts().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_policy_runs_once_more() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_manual_trigger(ManualTriggerPolicy::Queue));
    let runs = Arc::new(AtomicUsize::new(0));
    let mut factory = StrategyFactory::new();
    factory.register("mysql", Arc::new(SlowGenerator { runs: Arc::clone(&runs) }));
    let (_orchestrator, handle, task) = start_with(ctx.config().unwrap().clone(), factory);

    wait_for(|| matches!(handle.state(), SchedulerState::Waiting { .. })).await;
    assert_eq!(handle.run_now(), TriggerOutcome::Accepted);
    wait_for(|| matches!(handle.state(), SchedulerState::Running { .. })).await;

    assert_eq!(handle.run_now(), TriggerOutcome::Queued);
    assert_eq!(handle.run_now(), TriggerOutcome::Coalesced);

    wait_for(|| runs.load(Ordering::SeqCst) == 2).await;
    handle.shutdown();
    task.await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
