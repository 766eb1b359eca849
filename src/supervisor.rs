//! Application-level orchestration of a set of actors.
//!
//! The [`Supervisor`] owns the actor registry (name -> actor) and is the only
//! component that starts, stops and snapshots actors.
//!
//! ## Responsibilities
//!
//! - **Registry**: built once through [`SupervisorBuilder`] and frozen; names are
//!   unique and double as routing keys and snapshot keys.
//! - **Startup**: every actor is spawned as its own Tokio task that runs `prepare`
//!   and then `run`. A failing `prepare` isolates that actor only.
//! - **Routing**: [`Supervisor::send`] resolves a name to a mailbox.
//! - **Shutdown**: a `RequestShutdown` goes to every running actor concurrently;
//!   actors that do not acknowledge within the per-actor timeout are aborted and
//!   reported as forced. A forced stop is never escalated as an application error.
//! - **State**: [`Supervisor::collect_state`] and [`Supervisor::restore_state`]
//!   capture and apply a [`Snapshot`]. Running actors are reached through control
//!   messages (serviced between dispatches); idle actors are accessed directly.
//!
//! ## Failure isolation
//!
//! Errors and panics in an actor's `run`, handlers or `shutdown` end only that
//! actor's task. The supervisor observes them as [`ActorEvent::Failed`] and the
//! actor's phase becomes [`ActorPhase::Failed`]; siblings keep running.
//!
//! # Example
//!
//! ```no_run
//! use daq_actors::{actor::EchoActor, supervisor::Supervisor};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut supervisor = Supervisor::builder()
//!     .actor("echo", EchoActor)
//!     .build()?;
//!
//! supervisor.start().await?;
//! supervisor.send_user("echo", "Hello".to_string())?;
//!
//! let report = supervisor.shutdown(Some(Duration::from_secs(1))).await;
//! assert!(report.forced.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::actor::{panic_message, shutdown_once, Actor, ActorContext, ActorPhase};
use crate::config::RuntimeConfig;
use crate::error::{
    PrepareFailure, RegistryError, RoutingError, ShutdownTimeoutError, StartupError,
    StateApplyError,
};
use crate::mailbox::{self, Mailbox};
use crate::messages::{Message, ShutdownAckReceiver, ShutdownRequest};
use crate::router::Router;
use crate::state::{RestoreReport, SerializationSchema, Snapshot};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn, Instrument};

/// Lifecycle notifications published by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorEvent {
    /// `prepare` succeeded and `run` has been scheduled.
    Started {
        /// Actor name.
        actor: String,
    },
    /// `prepare` failed; the actor will not run.
    PrepareFailed {
        /// Actor name.
        actor: String,
        /// Rendered error.
        reason: String,
    },
    /// The actor stopped cleanly.
    Stopped {
        /// Actor name.
        actor: String,
    },
    /// The actor stopped with an error.
    Failed {
        /// Actor name.
        actor: String,
        /// Rendered error.
        reason: String,
    },
    /// The actor did not acknowledge shutdown in time and was aborted.
    ForceTerminated {
        /// Actor name.
        actor: String,
    },
}

/// Outcome of [`Supervisor::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Actors that acknowledged the shutdown request.
    pub acknowledged: BTreeSet<String>,
    /// Actors that were force-terminated after their timeout.
    pub forced: BTreeSet<String>,
    /// Actors that were not running when shutdown was requested (never started,
    /// failed to prepare, or already exited), plus actors whose task ended without
    /// acknowledging.
    pub already_stopped: BTreeSet<String>,
    /// The recorded timeout for each forced actor.
    pub timeouts: Vec<ShutdownTimeoutError>,
}

/// Timeouts and schema used by a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Per-actor budget for acknowledging shutdown in [`Supervisor::stop`].
    /// `None` waits indefinitely.
    pub shutdown_timeout: Option<Duration>,
    /// Budget for a running actor to report on `prepare` during [`Supervisor::start`].
    pub prepare_timeout: Option<Duration>,
    /// Budget for a running actor to answer a state request.
    pub state_timeout: Duration,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
    /// Stamp written into every snapshot.
    pub schema: SerializationSchema,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout: Some(Duration::from_secs(5)),
            prepare_timeout: Some(Duration::from_secs(5)),
            state_timeout: Duration::from_secs(1),
            event_capacity: 64,
            schema: SerializationSchema::default(),
        }
    }
}

impl SupervisorSettings {
    /// Settings derived from a loaded runtime configuration.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            shutdown_timeout: millis(config.actors.shutdown_timeout_ms),
            prepare_timeout: millis(config.actors.prepare_timeout_ms),
            state_timeout: Duration::from_millis(config.actors.state_timeout_ms),
            event_capacity: config.actors.event_capacity,
            schema: SerializationSchema::new(config.application.user_version.clone()),
        }
    }
}

/// Collects actors and settings, then freezes them into a [`Supervisor`].
pub struct SupervisorBuilder {
    actors: Vec<(String, Box<dyn Actor>)>,
    settings: SupervisorSettings,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorBuilder {
    /// Empty builder with default settings.
    pub fn new() -> Self {
        Self {
            actors: Vec::new(),
            settings: SupervisorSettings::default(),
        }
    }

    /// Registers `actor` under `name`. Names are validated by [`build`](Self::build).
    pub fn actor(mut self, name: impl Into<String>, actor: impl Actor) -> Self {
        self.actors.push((name.into(), Box::new(actor)));
        self
    }

    /// Registers an already boxed actor.
    pub fn boxed_actor(mut self, name: impl Into<String>, actor: Box<dyn Actor>) -> Self {
        self.actors.push((name.into(), actor));
        self
    }

    /// Replaces all settings.
    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the default per-actor shutdown timeout.
    pub fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.shutdown_timeout = timeout;
        self
    }

    /// Sets the budget for answering state requests.
    pub fn state_timeout(mut self, timeout: Duration) -> Self {
        self.settings.state_timeout = timeout;
        self
    }

    /// Sets the snapshot schema stamp.
    pub fn schema(mut self, schema: SerializationSchema) -> Self {
        self.settings.schema = schema;
        self
    }

    /// Validates names and freezes the registry and routing table.
    pub fn build(self) -> Result<Supervisor, RegistryError> {
        let mut slots = BTreeMap::new();
        let mut routes = HashMap::new();

        for (name, actor) in self.actors {
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if slots.contains_key(&name) {
                return Err(RegistryError::DuplicateName(name));
            }
            let (sender, mailbox) = mailbox::channel(name.clone());
            routes.insert(name.clone(), sender);
            slots.insert(
                name.clone(),
                ActorSlot {
                    phase: Arc::new(watch::channel(ActorPhase::Created).0),
                    state: SlotState::Idle { actor, mailbox },
                },
            );
        }

        let (events, _) = broadcast::channel(self.settings.event_capacity.max(1));
        Ok(Supervisor {
            slots,
            router: Router::new(routes),
            events,
            settings: self.settings,
            started: false,
        })
    }
}

/// What an actor task hands back when it ends.
struct ActorExit {
    actor: Box<dyn Actor>,
}

enum SlotState {
    /// Registered; owns the actor and its mailbox until started.
    Idle {
        actor: Box<dyn Actor>,
        mailbox: Mailbox,
    },
    Running(JoinHandle<ActorExit>),
    /// Shutdown requested; the task handle is owned by the pending stop.
    Stopping(AbortHandle),
    /// Task ended. `None` when the actor was lost to a forced abort.
    Stopped(Option<Box<dyn Actor>>),
}

struct ActorSlot {
    phase: Arc<watch::Sender<ActorPhase>>,
    state: SlotState,
}

impl ActorSlot {
    /// Actor accessible without going through its mailbox.
    fn idle_actor(&mut self) -> Option<&mut Box<dyn Actor>> {
        match &mut self.state {
            SlotState::Idle { actor, .. } | SlotState::Stopped(Some(actor)) => Some(actor),
            _ => None,
        }
    }
}

/// Owner of the actor registry.
pub struct Supervisor {
    slots: BTreeMap<String, ActorSlot>,
    router: Router,
    events: broadcast::Sender<ActorEvent>,
    settings: SupervisorSettings,
    started: bool,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Registered actor names, sorted.
    pub fn actor_names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    /// The frozen routing table, for anything that needs to address actors.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Active settings.
    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Subscribes to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ActorEvent> {
        self.events.subscribe()
    }

    /// Current phase of `actor`.
    pub fn phase(&self, actor: &str) -> Option<ActorPhase> {
        self.slots.get(actor).map(|slot| *slot.phase.borrow())
    }

    /// Watches the phase of `actor`.
    pub fn watch_phase(&self, actor: &str) -> Option<watch::Receiver<ActorPhase>> {
        self.slots.get(actor).map(|slot| slot.phase.subscribe())
    }

    /// Waits until `actor` reaches `Stopped` or `Failed`.
    pub async fn wait_stopped(&self, actor: &str) -> Result<ActorPhase, RoutingError> {
        let mut rx = self
            .watch_phase(actor)
            .ok_or_else(|| RoutingError::UnknownActor(actor.to_string()))?;
        let phase = rx
            .wait_for(|phase| phase.is_terminal())
            .await
            .map(|phase| *phase)
            .unwrap_or(ActorPhase::Failed);
        Ok(phase)
    }

    /// Enqueues `message` into the mailbox of `actor`.
    pub fn send(&self, actor: &str, message: Message) -> Result<(), RoutingError> {
        let result = self.router.send(actor, message);
        if let Err(err) = &result {
            debug!(error = %err, "Routing failed");
        }
        result
    }

    /// Enqueues `value` as a user message into the mailbox of `actor`.
    pub fn send_user<T: Any + Send>(&self, actor: &str, value: T) -> Result<(), RoutingError> {
        self.send(actor, Message::user(value))
    }

    /// Prepares every actor concurrently and schedules each `run` as its own task.
    ///
    /// An actor whose `prepare` fails (or panics, or exceeds the prepare timeout)
    /// is marked `Failed` and gets no `run`; all other actors start regardless.
    /// The failures are returned together once every actor has reported.
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if self.started {
            return Err(StartupError::AlreadyStarted);
        }
        self.started = true;
        info!(actors = self.slots.len(), "Starting actors");

        let mut pending = Vec::with_capacity(self.slots.len());
        for (name, slot) in self.slots.iter_mut() {
            let SlotState::Idle { actor, mailbox } =
                std::mem::replace(&mut slot.state, SlotState::Stopped(None))
            else {
                continue;
            };

            let (prepared_tx, prepared_rx) = oneshot::channel();
            let ctx = ActorContext::new(
                name.clone(),
                mailbox,
                self.router.clone(),
                slot.phase.clone(),
            );
            let span = tracing::info_span!("actor", name = %name);
            let handle = tokio::spawn(
                drive_actor(actor, ctx, prepared_tx, self.events.clone()).instrument(span),
            );
            slot.state = SlotState::Running(handle);
            pending.push((name.clone(), prepared_rx));
        }

        let prepare_timeout = self.settings.prepare_timeout;
        let outcomes = join_all(pending.into_iter().map(|(name, rx)| async move {
            let outcome = match within(prepare_timeout, rx).await {
                Some(Ok(Ok(()))) => PrepareOutcome::Ready,
                Some(Ok(Err(reason))) => PrepareOutcome::Failed(reason),
                Some(Err(_)) => PrepareOutcome::Failed("actor task ended before reporting".to_string()),
                None => PrepareOutcome::TimedOut(prepare_timeout.unwrap_or_default()),
            };
            (name, outcome)
        }))
        .await;

        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            let reason = match outcome {
                PrepareOutcome::Ready => continue,
                PrepareOutcome::Failed(reason) => reason,
                PrepareOutcome::TimedOut(budget) => {
                    let reason = format!("prepare did not finish within {budget:?}");
                    if let Some(slot) = self.slots.get_mut(&name) {
                        if let SlotState::Running(handle) =
                            std::mem::replace(&mut slot.state, SlotState::Stopped(None))
                        {
                            handle.abort();
                            // The task may still write its own phase until it is gone.
                            let exit = handle.await.ok();
                            slot.state = SlotState::Stopped(exit.map(|exit| exit.actor));
                        }
                        slot.phase.send_replace(ActorPhase::Failed);
                    }
                    error!(actor = %name, %reason, "Aborted actor stuck in prepare");
                    let _ = self.events.send(ActorEvent::PrepareFailed {
                        actor: name.clone(),
                        reason: reason.clone(),
                    });
                    reason
                }
            };
            failures.push(PrepareFailure {
                actor: name,
                reason,
            });
        }
        self.reap_finished().await;

        if failures.is_empty() {
            info!("All actors started");
            Ok(())
        } else {
            let err = StartupError::PrepareFailed { failures };
            warn!(error = %err, "Some actors failed to start");
            Err(err)
        }
    }

    /// Stops every actor using the configured default timeout.
    pub async fn stop(&mut self) -> ShutdownReport {
        let timeout = self.settings.shutdown_timeout;
        self.shutdown(timeout).await
    }

    /// Sends a shutdown request to every running actor and waits for each
    /// acknowledgement, bounded by `timeout_per_actor`.
    ///
    /// Actors are stopped concurrently. Stragglers are aborted and listed under
    /// `forced`. Calling this again sends nothing and lists every actor under
    /// `already_stopped`.
    pub async fn shutdown(&mut self, timeout_per_actor: Option<Duration>) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut stopping = Vec::new();

        for (name, slot) in self.slots.iter_mut() {
            let handle = match std::mem::replace(&mut slot.state, SlotState::Stopped(None)) {
                SlotState::Running(handle) => handle,
                SlotState::Stopping(abort) => {
                    // Left over from a shutdown that was cancelled mid-wait.
                    abort.abort();
                    warn!(actor = %name, "Aborting actor left over from an interrupted shutdown");
                    slot.phase.send_replace(ActorPhase::Failed);
                    let _ = self.events.send(ActorEvent::ForceTerminated {
                        actor: name.clone(),
                    });
                    report.forced.insert(name.clone());
                    continue;
                }
                other => {
                    slot.state = other;
                    report.already_stopped.insert(name.clone());
                    continue;
                }
            };

            slot.state = SlotState::Stopping(handle.abort_handle());
            let (request, ack) = ShutdownRequest::new();
            let delivered = self.router.send(name, request.into_message()).is_ok();
            stopping.push(stop_actor(name.clone(), handle, delivered.then_some(ack), timeout_per_actor));
        }

        if !stopping.is_empty() {
            info!(actors = stopping.len(), timeout = ?timeout_per_actor, "Shutting down actors");
        }

        for (name, outcome, exit) in join_all(stopping).await {
            let Some(slot) = self.slots.get_mut(&name) else {
                continue;
            };
            slot.state = SlotState::Stopped(exit.map(|exit| exit.actor));
            let forced = matches!(outcome, StopOutcome::Forced(_));
            if !forced && !slot.phase.borrow().is_terminal() {
                slot.phase.send_replace(ActorPhase::Stopped);
            }
            match outcome {
                StopOutcome::Acknowledged => {
                    report.acknowledged.insert(name);
                }
                StopOutcome::AlreadyStopped => {
                    report.already_stopped.insert(name);
                }
                StopOutcome::Forced(timeout) => {
                    slot.phase.send_replace(ActorPhase::Failed);
                    let err = ShutdownTimeoutError {
                        actor: name.clone(),
                        timeout,
                    };
                    warn!(error = %err, "Force-terminated actor");
                    let _ = self.events.send(ActorEvent::ForceTerminated {
                        actor: name.clone(),
                    });
                    report.timeouts.push(err);
                    report.forced.insert(name);
                }
            }
        }

        report
    }

    /// Captures the state of every actor into a snapshot.
    ///
    /// Actors that cannot answer (force-terminated, or running but unresponsive
    /// within the state timeout) are omitted and logged.
    pub async fn collect_state(&mut self) -> Snapshot {
        self.reap_finished().await;
        let mut snapshot = Snapshot::new(self.settings.schema.clone());
        let mut requests = Vec::new();

        for (name, slot) in self.slots.iter_mut() {
            if let Some(actor) = slot.idle_actor() {
                snapshot.insert(name.clone(), actor.collect_state());
                continue;
            }
            if !matches!(slot.state, SlotState::Running(_)) {
                warn!(actor = %name, "Actor state lost to forced termination, omitting");
                continue;
            }
            let (tx, rx) = oneshot::channel();
            match self.router.send(name, Message::CollectState(tx)) {
                Ok(()) => requests.push(await_reply(name.clone(), rx, self.settings.state_timeout)),
                Err(err) => warn!(error = %err, "Cannot collect actor state"),
            }
        }

        for (name, reply) in join_all(requests).await {
            match reply {
                Ok(state) => snapshot.insert(name, state),
                Err(reason) => warn!(actor = %name, %reason, "Actor did not report state, omitting"),
            }
        }
        snapshot
    }

    /// Applies `snapshot` to the live registry.
    ///
    /// Registered actors missing from the snapshot are left untouched; entries for
    /// actors that are no longer registered are skipped. An actor rejecting its
    /// state keeps its previous state and the rejection is logged and reported.
    pub async fn restore_state(&mut self, snapshot: &Snapshot) -> RestoreReport {
        self.reap_finished().await;
        let mut report = RestoreReport::default();
        if !snapshot.schema.is_current() {
            warn!(
                found = snapshot.schema.format_version,
                "Restoring snapshot written with a different format version"
            );
        }

        for name in snapshot.actors.keys() {
            if !self.slots.contains_key(name) {
                debug!(actor = %name, "Skipping state for unregistered actor");
                report.unknown.insert(name.clone());
            }
        }

        let mut requests = Vec::new();
        for (name, slot) in self.slots.iter_mut() {
            let Some(state) = snapshot.get(name) else {
                report.missing.insert(name.clone());
                continue;
            };
            if let Some(actor) = slot.idle_actor() {
                match actor.receive_state(state) {
                    Ok(()) => {
                        report.applied.insert(name.clone());
                    }
                    Err(err) => {
                        warn!(actor = %name, error = %err, "Actor rejected restored state");
                        report.rejected.insert(name.clone(), err);
                    }
                }
                continue;
            }

            let unavailable = |reason: String| StateApplyError::Unavailable {
                actor: name.clone(),
                reason,
            };
            if !matches!(slot.state, SlotState::Running(_)) {
                report
                    .rejected
                    .insert(name.clone(), unavailable("force-terminated".to_string()));
                continue;
            }
            let (tx, rx) = oneshot::channel();
            let message = Message::ReceiveState {
                state: state.clone(),
                respond_to: tx,
            };
            match self.router.send(name, message) {
                Ok(()) => requests.push(await_reply(name.clone(), rx, self.settings.state_timeout)),
                Err(err) => {
                    report.rejected.insert(name.clone(), unavailable(err.to_string()));
                }
            }
        }

        for (name, reply) in join_all(requests).await {
            let err = match reply {
                Ok(Ok(())) => {
                    report.applied.insert(name);
                    continue;
                }
                Ok(Err(err)) => err,
                Err(reason) => StateApplyError::Unavailable {
                    actor: name.clone(),
                    reason,
                },
            };
            warn!(actor = %name, error = %err, "Restoring actor state failed");
            report.rejected.insert(name, err);
        }
        report
    }

    /// Live, non-persisted status of `actor`. `None` if it has none or does not
    /// answer within the state timeout.
    pub async fn collect_remote_state(
        &mut self,
        actor: &str,
    ) -> Result<Option<serde_json::Value>, RoutingError> {
        self.reap_finished().await;
        let slot = self
            .slots
            .get_mut(actor)
            .ok_or_else(|| RoutingError::UnknownActor(actor.to_string()))?;
        if let Some(idle) = slot.idle_actor() {
            return Ok(idle.collect_remote_state());
        }

        let (tx, rx) = oneshot::channel();
        self.router.send(actor, Message::CollectRemoteState(tx))?;
        match await_reply(actor.to_string(), rx, self.settings.state_timeout).await {
            (_, Ok(remote)) => Ok(remote),
            (_, Err(reason)) => {
                debug!(%actor, %reason, "No remote state");
                Ok(None)
            }
        }
    }

    /// Moves actors whose task already ended back into their slot.
    async fn reap_finished(&mut self) {
        for slot in self.slots.values_mut() {
            let finished = matches!(&slot.state, SlotState::Running(h) if h.is_finished());
            if !finished {
                continue;
            }
            if let SlotState::Running(handle) =
                std::mem::replace(&mut slot.state, SlotState::Stopped(None))
            {
                slot.state = SlotState::Stopped(handle.await.ok().map(|exit| exit.actor));
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for (name, slot) in &self.slots {
            match &slot.state {
                SlotState::Running(handle) if !handle.is_finished() => handle.abort(),
                SlotState::Stopping(abort) if !abort.is_finished() => abort.abort(),
                _ => continue,
            }
            warn!(actor = %name, "Supervisor dropped while actor running, aborted");
        }
    }
}

enum PrepareOutcome {
    Ready,
    Failed(String),
    TimedOut(Duration),
}

enum StopOutcome {
    Acknowledged,
    AlreadyStopped,
    Forced(Duration),
}

/// Waits for one actor to acknowledge shutdown and reclaims its task.
async fn stop_actor(
    name: String,
    mut handle: JoinHandle<ActorExit>,
    ack: Option<ShutdownAckReceiver>,
    timeout: Option<Duration>,
) -> (String, StopOutcome, Option<ActorExit>) {
    let acknowledged = match ack {
        Some(ack) => match within(timeout, ack).await {
            Some(Ok(ack)) => {
                if let Some(error) = &ack.error {
                    warn!(actor = %name, %error, "Actor acknowledged shutdown with error");
                }
                true
            }
            Some(Err(_)) => false,
            None => {
                handle.abort();
                let _ = handle.await;
                return (name, StopOutcome::Forced(timeout.unwrap_or_default()), None);
            }
        },
        None => false,
    };

    let outcome = if acknowledged {
        StopOutcome::Acknowledged
    } else {
        StopOutcome::AlreadyStopped
    };
    match within(timeout, &mut handle).await {
        Some(joined) => (name, outcome, joined.ok()),
        None => {
            // Acknowledged (or dropped the request) but never returned from run.
            handle.abort();
            let _ = handle.await;
            let outcome = if acknowledged {
                StopOutcome::Acknowledged
            } else {
                StopOutcome::Forced(timeout.unwrap_or_default())
            };
            (name, outcome, None)
        }
    }
}

async fn within<F: std::future::Future>(timeout: Option<Duration>, fut: F) -> Option<F::Output> {
    match timeout {
        Some(budget) => tokio::time::timeout(budget, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn await_reply<T>(
    name: String,
    rx: oneshot::Receiver<T>,
    timeout: Duration,
) -> (String, Result<T, String>) {
    let reply = match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err("actor stopped before answering".to_string()),
        Err(_) => Err(format!("no answer within {timeout:?}")),
    };
    (name, reply)
}

/// Body of every actor task: prepare, report, run, then guarantee one shutdown.
async fn drive_actor(
    mut actor: Box<dyn Actor>,
    mut ctx: ActorContext,
    prepared: oneshot::Sender<Result<(), String>>,
    events: broadcast::Sender<ActorEvent>,
) -> ActorExit {
    let name = ctx.name().to_string();
    ctx.set_phase(ActorPhase::Preparing);

    let prepare = AssertUnwindSafe(actor.prepare(&mut ctx)).catch_unwind().await;
    let prepare = match prepare {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(panic) => Err(panic_message(panic.as_ref())),
    };
    if let Err(reason) = prepare {
        error!(%reason, "Actor failed to prepare");
        ctx.set_phase(ActorPhase::Failed);
        let _ = events.send(ActorEvent::PrepareFailed {
            actor: name,
            reason: reason.clone(),
        });
        let _ = prepared.send(Err(reason));
        return ActorExit { actor };
    }

    ctx.set_phase(ActorPhase::Running);
    let _ = events.send(ActorEvent::Started {
        actor: name.clone(),
    });
    let _ = prepared.send(Ok(()));
    info!("Actor running");

    let run = AssertUnwindSafe(actor.run(&mut ctx)).catch_unwind().await;
    let run_error = match run {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(format!("{err:#}")),
        Err(panic) => Some(panic_message(panic.as_ref())),
    };
    if let Some(reason) = &run_error {
        error!(%reason, "Actor run failed");
    }

    shutdown_once(actor.as_mut(), &mut ctx).await;

    match run_error.or_else(|| ctx.shutdown_error().map(str::to_string)) {
        Some(reason) => {
            ctx.set_phase(ActorPhase::Failed);
            let _ = events.send(ActorEvent::Failed {
                actor: name,
                reason,
            });
        }
        None => {
            ctx.set_phase(ActorPhase::Stopped);
            info!("Actor stopped");
            let _ = events.send(ActorEvent::Stopped { actor: name });
        }
    }
    ActorExit { actor }
}
