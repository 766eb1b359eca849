//! Actor state capture and the persisted snapshot schema.
//!
//! Every actor can describe its externally visible state as an [`ActorState`] and
//! later take that value back. The supervisor aggregates the per-actor values
//! into a [`Snapshot`], stamped with a [`SerializationSchema`], which can be
//! written to and read from disk.
//!
//! ## Snapshot layout
//!
//! ```json
//! {
//!   "schema": {
//!     "format_version": 1,
//!     "runtime_version": "0.1.0",
//!     "user_version": "0.0.0",
//!     "app_root": null
//!   },
//!   "actors": {
//!     "counter": { "count": 4 }
//!   }
//! }
//! ```
//!
//! Snapshots only hold values. Nothing in a snapshot aliases a live actor.

use crate::error::StateApplyError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the snapshot layout written by this crate.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Opaque, actor-defined snapshot of an actor's state.
///
/// The runtime never looks inside; actors choose the shape via [`encode`](Self::encode)
/// and [`decode`](Self::decode). The empty state is JSON `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorState(serde_json::Value);

impl ActorState {
    /// State of an actor with nothing to persist.
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    /// Serializes `value` into a state.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self)
    }

    /// Deserializes the state into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StateApplyError> {
        T::deserialize(&self.0).map_err(|e| StateApplyError::Decode(e.to_string()))
    }

    /// Returns true for the empty state.
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    /// Borrows the raw JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for ActorState {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Version stamp written alongside every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationSchema {
    /// Layout version of the snapshot record itself.
    pub format_version: u32,
    /// Version of the runtime that wrote the snapshot.
    pub runtime_version: String,
    /// Application-defined version of the actor set.
    pub user_version: String,
    /// Root directory of the application that wrote the snapshot, if known.
    #[serde(default)]
    pub app_root: Option<PathBuf>,
}

impl Default for SerializationSchema {
    fn default() -> Self {
        Self::new("0.0.0")
    }
}

impl SerializationSchema {
    /// Schema for the current runtime with the given application version.
    pub fn new(user_version: impl Into<String>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            user_version: user_version.into(),
            app_root: None,
        }
    }

    /// Sets the application root.
    pub fn with_app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.app_root = Some(root.into());
        self
    }

    /// Returns true if this crate writes the same snapshot layout.
    pub fn is_current(&self) -> bool {
        self.format_version == SNAPSHOT_FORMAT_VERSION
    }
}

/// Supervisor-level aggregate of every actor's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Version stamp.
    pub schema: SerializationSchema,
    /// State per actor name.
    #[serde(default)]
    pub actors: BTreeMap<String, ActorState>,
}

impl Snapshot {
    /// Creates an empty snapshot stamped with `schema`.
    pub fn new(schema: SerializationSchema) -> Self {
        Self {
            schema,
            actors: BTreeMap::new(),
        }
    }

    /// State captured for `actor`, if any.
    pub fn get(&self, actor: &str) -> Option<&ActorState> {
        self.actors.get(actor)
    }

    /// Records the state of `actor`, replacing any previous entry.
    pub fn insert(&mut self, actor: impl Into<String>, state: ActorState) {
        self.actors.insert(actor.into(), state);
    }
}

/// Outcome of applying a snapshot to a live registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Actors that accepted their state.
    pub applied: BTreeSet<String>,
    /// Actors that rejected their state and kept the previous one.
    pub rejected: BTreeMap<String, StateApplyError>,
    /// Registered actors absent from the snapshot, left untouched.
    pub missing: BTreeSet<String>,
    /// Snapshot entries with no registered actor, skipped.
    pub unknown: BTreeSet<String>,
}

impl RestoreReport {
    /// Returns true when every registered actor with an entry accepted it.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Saves a snapshot to `path` as pretty-printed JSON.
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Loads a snapshot from `path`.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    if !snapshot.schema.is_current() {
        tracing::warn!(
            found = snapshot.schema.format_version,
            expected = SNAPSHOT_FORMAT_VERSION,
            "Snapshot was written with a different format version"
        );
    }
    Ok(snapshot)
}
