mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use pentest_pilot::agent::{DecisionProvider, Phase};
use pentest_pilot::bridge::ToolBridge;
use pentest_pilot::errors::PilotError;
use pentest_pilot::models::RunConfig;
use pentest_pilot::pool::{AgentPool, RoleCounts, WorkerRole, WorkerStatus};

fn pool(config: RunConfig, provider: Arc<dyn DecisionProvider>, bridge: Arc<dyn ToolBridge>) -> Arc<AgentPool> {
    Arc::new(AgentPool::new("pool-scan", config, provider, bridge, fast_settings()).unwrap())
}

fn pool_config(parallel: u32, max_iterations: u32) -> RunConfig {
    let mut config = run_config(max_iterations);
    config.parallel_agents = parallel;
    config
}

#[test]
fn test_partition_for_ten_agents() {
    let counts = RoleCounts::for_parallelism(10);
    assert_eq!(counts.get(WorkerRole::Crawler), 2);
    assert_eq!(counts.get(WorkerRole::Scanner), 4);
    assert_eq!(counts.get(WorkerRole::Fuzzer), 2);
    assert_eq!(counts.get(WorkerRole::Analyzer), 1);
    assert_eq!(counts.total(), 9);
}

#[test]
fn test_pool_builds_one_worker_per_slot() {
    let pool = pool(pool_config(10, 5), Arc::new(RoleAwareProvider::new(1)), Arc::new(FakeBridge::new()));
    let ids: Vec<&str> = pool.workers().iter().map(|w| w.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "crawler-1", "crawler-2", "scanner-1", "scanner-2", "scanner-3", "scanner-4", "fuzzer-1", "fuzzer-2",
            "analyzer-1",
        ]
    );
    let state = pool.state();
    assert_eq!(state.worker_count, 9);
    assert!(!state.is_running);
    assert!(state.workers.iter().all(|w| w.status == WorkerStatus::Idle));
}

#[tokio::test]
async fn test_pool_runs_all_workers_to_completion() {
    let bridge = Arc::new(FakeBridge::new());
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(3)), bridge.clone());

    let outcome = pool.start().await.unwrap();
    assert_eq!(outcome.phase, Phase::Completed);
    assert_eq!(outcome.stats.workers_completed, 4);
    assert_eq!(outcome.stats.requests_issued, 12);
    assert_eq!(bridge.calls(), 12);

    let state = pool.state();
    assert!(!state.is_running);
    assert_eq!(state.worker_count, 4);
    assert!(state.workers.iter().all(|w| w.status == WorkerStatus::Completed));
    assert!(state.workers.iter().all(|w| w.iteration_count == 3));
    assert_eq!(state.stats.iterations, 12);

    let entries = pool.log_entries(0);
    assert_eq!(entries.len() as u64, state.logs_count);
    assert!(entries.iter().enumerate().all(|(i, e)| e.index == i as u64));
    for worker in pool.workers() {
        assert!(entries.iter().any(|e| e.source.as_deref() == Some(worker.id.as_str())));
    }
    assert!(pool.get_logs(0).last().unwrap().contains("Pool completed"));
}

#[tokio::test]
async fn test_workers_only_use_their_role_tools() {
    let bridge = Arc::new(FakeBridge::new());
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(1)), bridge.clone());
    pool.start().await.unwrap();

    let errors = pool.get_logs(0).iter().filter(|l| l.contains("[ERROR]")).count();
    assert_eq!(errors, 0);
    assert_eq!(bridge.names().len(), 4);
}

#[tokio::test]
async fn test_pool_shares_one_rate_limiter() {
    let mut config = pool_config(4, 20);
    config.rate_limit = 10.0;
    let bridge = Arc::new(FakeBridge::new());
    let pool = pool(config, Arc::new(RoleAwareProvider::new(5)), bridge.clone());

    let started = Instant::now();
    let outcome = pool.start().await.unwrap();
    // 20 calls against a 10/s budget with a burst of 10.
    assert_eq!(outcome.stats.requests_issued, 20);
    assert!(started.elapsed() >= Duration::from_millis(800), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_one_failed_worker_does_not_abort_pool() {
    let mut provider = RoleAwareProvider::new(2);
    provider.failing_roles = vec!["analyzer"];
    let pool = pool(pool_config(4, 20), Arc::new(provider), Arc::new(FakeBridge::new()));

    let outcome = pool.start().await.unwrap();
    assert_eq!(outcome.phase, Phase::Completed);
    assert_eq!(outcome.stats.workers_failed, 1);
    assert_eq!(outcome.stats.workers_completed, 3);

    let state = pool.state();
    let analyzer = state.workers.iter().find(|w| w.role == WorkerRole::Analyzer).unwrap();
    assert_eq!(analyzer.status, WorkerStatus::Failed);
    assert!(state.last_error.unwrap().starts_with("analyzer-1"));
}

#[tokio::test]
async fn test_pool_fails_when_every_worker_fails() {
    let mut provider = RoleAwareProvider::new(2);
    provider.failing_roles = vec!["crawler", "scanner", "fuzzer", "analyzer"];
    let pool = pool(pool_config(4, 20), Arc::new(provider), Arc::new(FakeBridge::new()));

    let err = pool.start().await.unwrap_err();
    assert!(matches!(err, PilotError::AllWorkersFailed(4)));
    let state = pool.state();
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.stats.workers_failed, 4);
    assert!(!state.is_running);
}

#[tokio::test]
async fn test_pool_with_unavailable_bridge_fails_fast() {
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(2)), Arc::new(FakeBridge::unavailable()));
    let err = pool.start().await.unwrap_err();
    assert!(matches!(err, PilotError::ToolBridgeUnavailable(_)));
    assert_eq!(pool.state().phase, Phase::Failed);
}

#[tokio::test]
async fn test_pool_stop_waits_for_every_worker() {
    let mut provider = RoleAwareProvider::new(10_000);
    provider.delay = Duration::from_millis(5);
    let bridge = Arc::new(FakeBridge::new());
    let pool = pool(pool_config(4, 500), Arc::new(provider), bridge.clone());
    let runner = pool.clone();
    let task = tokio::spawn(async move { runner.start().await });

    assert!(eventually(|| bridge.calls() >= 8).await);
    let snapshot = pool.stop().await;
    let calls_at_stop = bridge.calls();

    assert_eq!(snapshot.phase, Phase::Stopped);
    assert!(!snapshot.is_running);
    assert!(snapshot.workers.iter().all(|w| w.status == WorkerStatus::Stopped));
    assert_eq!(snapshot.stats.workers_stopped, 4);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.phase, Phase::Stopped);
    assert_eq!(bridge.calls(), calls_at_stop);

    let again = pool.stop().await;
    assert_eq!(again.phase, Phase::Stopped);
}

#[tokio::test]
async fn test_pool_stop_before_start() {
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(2)), Arc::new(FakeBridge::new()));
    let snapshot = pool.stop().await;
    assert_eq!(snapshot.phase, Phase::Stopped);
    let outcome = pool.start().await.unwrap();
    assert_eq!(outcome.phase, Phase::Stopped);
    assert!(matches!(pool.start().await, Err(PilotError::AlreadyRunning(_))));
}

#[tokio::test]
async fn test_pool_pause_cascades() {
    let mut provider = RoleAwareProvider::new(10_000);
    provider.delay = Duration::from_millis(5);
    let bridge = Arc::new(FakeBridge::new());
    let pool = pool(pool_config(4, 500), Arc::new(provider), bridge.clone());
    let runner = pool.clone();
    let task = tokio::spawn(async move { runner.start().await });

    assert!(eventually(|| bridge.calls() >= 4).await);
    assert!(pool.pause());
    assert!(eventually(|| pool.state().is_paused).await);
    assert!(pool.state().workers.iter().all(|w| w.status == WorkerStatus::Paused));

    let frozen = pool.state().logs_count;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(pool.state().logs_count, frozen);

    assert!(pool.resume());
    assert!(eventually(|| pool.state().logs_count > frozen).await);
    assert!(!pool.state().is_paused);

    pool.stop().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_pool_merges_duplicate_findings() {
    let mut provider = RoleAwareProvider::new(3);
    provider.finding = Some(finding("IDOR on orders", "GET /api/orders/2"));
    let pool = pool(pool_config(4, 20), Arc::new(provider), Arc::new(FakeBridge::new()));
    let outcome = pool.start().await.unwrap();

    assert_eq!(outcome.stats.findings_count, 1);
    assert_eq!(pool.findings().len(), 1);
    let finding_logs = pool.get_logs(0).iter().filter(|l| l.contains("[FINDING]")).count();
    assert_eq!(finding_logs, 1);
}

#[tokio::test]
async fn test_pool_broadcasts_human_commands() {
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(1)), Arc::new(FakeBridge::new()));
    assert_eq!(pool.handle_user_command("prioritise /api/admin").unwrap(), 4);
    pool.start().await.unwrap();

    let human = pool.get_logs(0).iter().filter(|l| l.contains("[HUMAN]")).count();
    assert_eq!(human, 4);
    assert!(matches!(pool.handle_user_command("too late"), Err(PilotError::NotRunning(_))));
}

#[tokio::test]
async fn test_pool_endpoints_are_merged() {
    let pool = pool(pool_config(4, 20), Arc::new(RoleAwareProvider::new(1)), Arc::new(FakeBridge::new()));
    pool.start().await.unwrap();
    let endpoints = pool.endpoints();
    for role in ["crawler", "scanner", "fuzzer", "analyzer"] {
        assert!(endpoints.contains(&format!("{}/{}", TARGET, role)), "missing {}", role);
    }
}
