//! Saver registry with feature-based registration.
use crate::data::storage::{ForgetfulSaver, JsonSaver, RunSaver, SaveContext, UserExtras};
use crate::data::RunData;
use crate::error::SaveError;
use crate::metadata::RunMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[cfg(feature = "storage_csv")]
use crate::data::storage::CsvSaver;

/// Save formats compiled into this build.
#[cfg(feature = "storage_csv")]
pub const KNOWN_FORMATS: &[&str] = &["csv", "forget", "json"];
/// Save formats compiled into this build.
#[cfg(not(feature = "storage_csv"))]
pub const KNOWN_FORMATS: &[&str] = &["forget", "json"];

type SaverFactory = Box<dyn Fn() -> Arc<dyn RunSaver> + Send + Sync>;

/// Registry of savers, looked up by [`RunSaver::short_name`].
///
/// Built-in savers are registered according to enabled Cargo features:
/// - `json` and `forget` always
/// - `csv` with `storage_csv`
///
/// # Examples
///
/// ```
/// use daq_actors::data::storage_factory::SaverRegistry;
///
/// let registry = SaverRegistry::new();
/// let saver = registry.create("json")?;
/// assert_eq!(saver.short_name(), "json");
/// # Ok::<(), daq_actors::error::SaveError>(())
/// ```
pub struct SaverRegistry {
    factories: HashMap<String, SaverFactory>,
}

impl Default for SaverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SaverRegistry {
    /// Creates a registry with every built-in saver enabled by features.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };

        registry.register("json", || Arc::new(JsonSaver));
        registry.register("forget", || Arc::new(ForgetfulSaver));

        #[cfg(feature = "storage_csv")]
        registry.register("csv", || Arc::new(CsvSaver));

        registry
    }

    /// Registers a custom saver factory, replacing any saver with the same name.
    pub fn register<F>(&mut self, format: &str, factory: F)
    where
        F: Fn() -> Arc<dyn RunSaver> + Send + Sync + 'static,
    {
        self.factories.insert(format.to_string(), Box::new(factory));
    }

    /// Creates the saver registered under `format`.
    pub fn create(&self, format: &str) -> Result<Arc<dyn RunSaver>, SaveError> {
        self.factories
            .get(format)
            .map(|factory| factory())
            .ok_or_else(|| SaveError::UnknownFormat(format.to_string()))
    }

    /// Registered format names, sorted.
    pub fn list_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.factories.keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Whether a saver is registered under `format`.
    pub fn is_available(&self, format: &str) -> bool {
        self.factories.contains_key(format)
    }
}

/// A save running on the blocking pool.
#[derive(Debug)]
pub struct BackgroundSave {
    handle: JoinHandle<Result<(), SaveError>>,
}

impl BackgroundSave {
    /// Waits for the save to finish.
    pub async fn wait(self) -> Result<(), SaveError> {
        self.handle
            .await
            .map_err(|e| SaveError::Background(e.to_string()))?
    }

    /// Whether the save has completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Saves a run and its extras without blocking the async executor.
///
/// Must be called from within a Tokio runtime.
pub fn save_in_background(
    saver: Arc<dyn RunSaver>,
    metadata: RunMetadata,
    data: RunData,
    extras: UserExtras,
    ctx: SaveContext,
) -> BackgroundSave {
    let handle = tokio::task::spawn_blocking(move || {
        saver.save_run(&metadata, &data, &ctx)?;
        saver.save_user_extras(&extras, &ctx)
    });
    BackgroundSave { handle }
}
