//! Probe actors shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use daq_actors::state::ActorState;
use daq_actors::supervisor::Supervisor;
use daq_actors::{Actor, ActorContext, Payload};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters shared between a [`Probe`] and the test that owns it.
#[derive(Debug, Clone, Default)]
pub struct ProbeHandle {
    pub seen: Arc<Mutex<Vec<u32>>>,
    pub steps: Arc<AtomicUsize>,
    pub prepares: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl ProbeHandle {
    pub fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

/// Messaging actor that records `u32` messages, counts steps and lifecycle calls.
///
/// A `&'static str` message of `"boom"` makes the handler fail and `"panic"` panics.
#[derive(Debug, Default)]
pub struct Probe {
    handle: ProbeHandle,
}

impl Probe {
    pub fn new() -> (Self, ProbeHandle) {
        let handle = ProbeHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[async_trait]
impl Actor for Probe {
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        self.handle.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_user_message(
        &mut self,
        _ctx: &mut ActorContext,
        payload: Payload,
    ) -> anyhow::Result<()> {
        if let Some(n) = payload.downcast_ref::<u32>() {
            self.handle.seen.lock().unwrap().push(*n);
        } else if let Some(cmd) = payload.downcast_ref::<&'static str>() {
            match *cmd {
                "boom" => anyhow::bail!("boom"),
                "panic" => panic!("probe told to panic"),
                _ => {}
            }
        }
        Ok(())
    }

    async fn run_step(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        self.handle.steps.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        self.handle.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn collect_state(&self) -> ActorState {
        ActorState::from(json!({ "seen": self.handle.seen() }))
    }
}

/// Actor whose `prepare` always fails.
#[derive(Debug, Default)]
pub struct BrokenPrepare {
    pub shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for BrokenPrepare {
    async fn prepare(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        anyhow::bail!("serial port busy")
    }

    async fn shutdown(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Actor whose `shutdown` takes `delay` before returning.
#[derive(Debug)]
pub struct SlowShutdown {
    pub delay: Duration,
}

#[async_trait]
impl Actor for SlowShutdown {
    async fn shutdown(&mut self, _ctx: &mut ActorContext) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Polls `f` every few milliseconds until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut f: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    f()
}

/// Reads the `count` field of an actor's remote state.
pub async fn remote_count(supervisor: &mut Supervisor, actor: &str) -> Option<u64> {
    supervisor
        .collect_remote_state(actor)
        .await
        .ok()
        .flatten()
        .and_then(|remote| remote["count"].as_u64())
}
