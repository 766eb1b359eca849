//! Integration tests for graceful and forced shutdown.

mod common;

use async_trait::async_trait;
use common::{Probe, SlowShutdown};
use daq_actors::error::RoutingError;
use daq_actors::supervisor::{ActorEvent, Supervisor};
use daq_actors::{Actor, ActorContext, ActorPhase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_shutdown_invoked_once_and_acknowledged() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder().actor("probe", probe).build().unwrap();
    supervisor.start().await.unwrap();

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert_eq!(report.acknowledged.len(), 1);
    assert!(report.forced.is_empty());
    assert_eq!(handle.shutdowns(), 1);
    assert_eq!(supervisor.phase("probe"), Some(ActorPhase::Stopped));
}

#[tokio::test]
async fn test_multiple_shutdown_calls() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder().actor("probe", probe).build().unwrap();
    supervisor.start().await.unwrap();

    // First shutdown
    let first = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(first.acknowledged.contains("probe"));

    // Second shutdown sends nothing
    let second = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(second.acknowledged.is_empty());
    assert!(second.already_stopped.contains("probe"));
    assert_eq!(handle.shutdowns(), 1);

    assert_eq!(
        supervisor.send_user("probe", 1_u32),
        Err(RoutingError::MailboxClosed("probe".to_string()))
    );
}

#[tokio::test]
async fn test_stop_uses_configured_timeout() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder()
        .actor("probe", probe)
        .shutdown_timeout(Some(Duration::from_millis(500)))
        .build()
        .unwrap();
    supervisor.start().await.unwrap();

    let report = supervisor.stop().await;
    assert!(report.acknowledged.contains("probe"));
    assert_eq!(handle.shutdowns(), 1);
}

#[tokio::test]
async fn test_slow_actor_is_force_terminated() {
    let (probe, _handle) = Probe::new();
    let mut supervisor = Supervisor::builder()
        .actor("probe", probe)
        .actor(
            "slow",
            SlowShutdown {
                delay: Duration::from_secs(5),
            },
        )
        .build()
        .unwrap();
    let mut events = supervisor.events();
    supervisor.start().await.unwrap();

    let start = Instant::now();
    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_secs(3), "Shutdown took too long: {:?}", elapsed);
    assert!(report.acknowledged.contains("probe"));
    assert!(report.forced.contains("slow"));
    assert_eq!(report.timeouts.len(), 1);
    assert_eq!(report.timeouts[0].actor, "slow");
    assert_eq!(supervisor.phase("slow"), Some(ActorPhase::Failed));

    let mut forced_event = false;
    while let Ok(event) = events.try_recv() {
        if event == (ActorEvent::ForceTerminated { actor: "slow".into() }) {
            forced_event = true;
        }
    }
    assert!(forced_event);
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder().actor("probe", probe).build().unwrap();

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.already_stopped.contains("probe"));
    assert_eq!(handle.shutdowns(), 0);
}

#[derive(Default)]
struct FailingShutdown;

#[async_trait]
impl Actor for FailingShutdown {
    async fn shutdown(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        anyhow::bail!("shutter stuck open")
    }
}

#[tokio::test]
async fn test_failing_shutdown_still_acknowledges() {
    let mut supervisor = Supervisor::builder()
        .actor("shutter", FailingShutdown)
        .build()
        .unwrap();
    let mut events = supervisor.events();
    supervisor.start().await.unwrap();

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.acknowledged.contains("shutter"));
    assert_eq!(supervisor.phase("shutter"), Some(ActorPhase::Failed));

    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        if let ActorEvent::Failed { reason, .. } = event {
            failed = Some(reason);
        }
    }
    assert!(failed.unwrap().contains("shutter stuck open"));
}

#[tokio::test]
async fn test_dropping_supervisor_aborts_actors() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder().actor("probe", probe).build().unwrap();
    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    drop(supervisor);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_drop = handle.steps();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.steps(), after_drop);
    assert_eq!(handle.shutdowns(), 0);
}

/// Ticks forever without reading its mailbox.
struct Deaf {
    ticks: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Deaf {
    async fn run(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        loop {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[tokio::test]
async fn test_dropping_supervisor_after_interrupted_shutdown_aborts_actors() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::builder()
        .actor("deaf", Deaf { ticks: ticks.clone() })
        .build()
        .unwrap();
    supervisor.start().await.unwrap();

    // Unbounded shutdown, abandoned by the caller.
    let waited = tokio::time::timeout(Duration::from_millis(50), supervisor.shutdown(None)).await;
    assert!(waited.is_err());
    drop(supervisor);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_drop = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
}

#[tokio::test]
async fn test_shutdown_after_interrupted_shutdown_forces_leftovers() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut supervisor = Supervisor::builder()
        .actor("deaf", Deaf { ticks: ticks.clone() })
        .build()
        .unwrap();
    supervisor.start().await.unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(50), supervisor.shutdown(None)).await;
    assert!(waited.is_err());

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.forced.contains("deaf"));
    assert_eq!(supervisor.phase("deaf"), Some(ActorPhase::Failed));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_abort = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), after_abort);
}
