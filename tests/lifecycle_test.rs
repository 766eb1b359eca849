//! Integration tests for startup and failure isolation.

mod common;

use async_trait::async_trait;
use common::{eventually, BrokenPrepare, Probe};
use daq_actors::error::StartupError;
use daq_actors::supervisor::{ActorEvent, Supervisor, SupervisorSettings};
use daq_actors::{Actor, ActorContext, ActorPhase};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

fn drain(events: &mut broadcast::Receiver<ActorEvent>) -> Vec<ActorEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

#[tokio::test]
async fn test_prepare_failure_is_isolated() {
    let (probe, handle) = Probe::new();
    let broken = BrokenPrepare::default();
    let broken_shutdowns = broken.shutdowns.clone();
    let mut supervisor = Supervisor::builder()
        .actor("stage", broken)
        .actor("probe", probe)
        .build()
        .unwrap();
    let mut events = supervisor.events();

    let err = supervisor.start().await.unwrap_err();
    let StartupError::PrepareFailed { failures } = err else {
        panic!("expected prepare failures, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].actor, "stage");
    assert!(failures[0].reason.contains("serial port busy"));

    assert_eq!(supervisor.phase("stage"), Some(ActorPhase::Failed));
    assert_eq!(supervisor.phase("probe"), Some(ActorPhase::Running));

    // The healthy sibling is fully functional.
    supervisor.send_user("probe", 3_u32).unwrap();
    assert!(eventually(Duration::from_secs(1), || handle.seen() == vec![3]).await);

    let emitted: BTreeSet<String> = drain(&mut events)
        .into_iter()
        .map(|event| match event {
            ActorEvent::Started { actor } => format!("started:{actor}"),
            ActorEvent::PrepareFailed { actor, .. } => format!("prepare-failed:{actor}"),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(
        emitted,
        BTreeSet::from(["prepare-failed:stage".to_string(), "started:probe".to_string()])
    );

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.acknowledged.contains("probe"));
    assert!(report.already_stopped.contains("stage"));
    assert_eq!(broken_shutdowns.load(Ordering::SeqCst), 0);
    assert_eq!(handle.prepares.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_error_fails_only_that_actor() {
    let (faulty, faulty_handle) = Probe::new();
    let (healthy, healthy_handle) = Probe::new();
    let mut supervisor = Supervisor::builder()
        .actor("faulty", faulty)
        .actor("healthy", healthy)
        .build()
        .unwrap();
    let mut events = supervisor.events();
    supervisor.start().await.unwrap();

    supervisor.send_user("faulty", "boom").unwrap();
    assert_eq!(supervisor.wait_stopped("faulty").await, Ok(ActorPhase::Failed));
    // The runtime still runs shutdown after a failed run.
    assert_eq!(faulty_handle.shutdowns(), 1);

    let failed: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            ActorEvent::Failed { actor, reason } => Some(format!("{actor}: {reason}")),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec!["faulty: boom".to_string()]);

    assert_eq!(supervisor.phase("healthy"), Some(ActorPhase::Running));
    supervisor.send_user("healthy", 1_u32).unwrap();
    assert!(eventually(Duration::from_secs(1), || healthy_handle.seen() == vec![1]).await);

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.acknowledged.contains("healthy"));
    assert!(report.already_stopped.contains("faulty"));
    assert_eq!(faulty_handle.shutdowns(), 1);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let (panicky, _panicky_handle) = Probe::new();
    let (healthy, healthy_handle) = Probe::new();
    let mut supervisor = Supervisor::builder()
        .actor("panicky", panicky)
        .actor("healthy", healthy)
        .build()
        .unwrap();
    let mut events = supervisor.events();
    supervisor.start().await.unwrap();

    supervisor.send_user("panicky", "panic").unwrap();
    assert_eq!(supervisor.wait_stopped("panicky").await, Ok(ActorPhase::Failed));

    let reason = drain(&mut events).into_iter().find_map(|event| match event {
        ActorEvent::Failed { actor, reason } if actor == "panicky" => Some(reason),
        _ => None,
    });
    assert_eq!(reason.as_deref(), Some("panicked: probe told to panic"));

    supervisor.send_user("healthy", 9_u32).unwrap();
    assert!(eventually(Duration::from_secs(1), || healthy_handle.seen() == vec![9]).await);
    supervisor.shutdown(Some(Duration::from_secs(1))).await;
}

#[derive(Default)]
struct HangingPrepare;

#[async_trait]
impl Actor for HangingPrepare {
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_prepare_timeout_isolates_actor() {
    let (probe, _handle) = Probe::new();
    let settings = SupervisorSettings {
        prepare_timeout: Some(Duration::from_millis(100)),
        ..SupervisorSettings::default()
    };
    let mut supervisor = Supervisor::builder()
        .settings(settings)
        .actor("hangs", HangingPrepare)
        .actor("probe", probe)
        .build()
        .unwrap();

    let start = Instant::now();
    let err = supervisor.start().await.unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(err.to_string().contains("hangs"));
    assert_eq!(supervisor.phase("hangs"), Some(ActorPhase::Failed));
    assert_eq!(supervisor.phase("probe"), Some(ActorPhase::Running));

    let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
    assert!(report.acknowledged.contains("probe"));
    assert!(report.already_stopped.contains("hangs"));
}

/// Finishes `prepare` right around the prepare timeout.
struct BorderlinePrepare;

#[async_trait]
impl Actor for BorderlinePrepare {
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_timed_out_prepare_stays_failed() {
    for _ in 0..10 {
        let settings = SupervisorSettings {
            prepare_timeout: Some(Duration::from_millis(50)),
            ..SupervisorSettings::default()
        };
        let mut supervisor = Supervisor::builder()
            .settings(settings)
            .actor("borderline", BorderlinePrepare)
            .build()
            .unwrap();

        if supervisor.start().await.is_ok() {
            supervisor.shutdown(Some(Duration::from_secs(1))).await;
            continue;
        }
        let phase = tokio::time::timeout(
            Duration::from_secs(1),
            supervisor.wait_stopped("borderline"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(phase, ActorPhase::Failed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(supervisor.phase("borderline"), Some(ActorPhase::Failed));
    }
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let (probe, handle) = Probe::new();
    let mut supervisor = Supervisor::builder().actor("probe", probe).build().unwrap();
    supervisor.start().await.unwrap();
    assert_eq!(supervisor.start().await, Err(StartupError::AlreadyStarted));
    assert_eq!(handle.prepares.load(Ordering::SeqCst), 1);
    supervisor.shutdown(Some(Duration::from_secs(1))).await;
}
