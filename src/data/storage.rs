//! Run persistence backends.
//!
//! A [`RunSaver`] writes one finished run into a directory. Savers are blocking by
//! nature; use [`save_in_background`](crate::data::storage_factory::save_in_background)
//! to keep them off the async executor.
use crate::{data::RunData, error::SaveError, metadata::RunMetadata};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Named user blobs saved next to a run. `None` entries are skipped.
pub type UserExtras = BTreeMap<String, Option<serde_json::Value>>;

/// Where a saver writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveContext {
    /// Directory receiving the run files; created on demand.
    pub save_directory: PathBuf,
}

impl SaveContext {
    /// Targets `save_directory`.
    pub fn new(save_directory: impl Into<PathBuf>) -> Self {
        Self {
            save_directory: save_directory.into(),
        }
    }

    fn ensure_directory(&self) -> Result<&Path, SaveError> {
        fs::create_dir_all(&self.save_directory)?;
        Ok(&self.save_directory)
    }
}

/// A persistence backend for finished runs.
pub trait RunSaver: Send + Sync {
    /// Identifier used to select this saver (e.g. in configuration).
    fn short_name(&self) -> &'static str;

    /// Writes the metadata and acquired data.
    fn save_run(
        &self,
        metadata: &RunMetadata,
        data: &RunData,
        ctx: &SaveContext,
    ) -> Result<(), SaveError>;

    fn save_user_extras(&self, extras: &UserExtras, ctx: &SaveContext) -> Result<(), SaveError>;
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SaveError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    debug!(path = %path.display(), "wrote json");
    Ok(())
}

fn write_metadata(dir: &Path, metadata: &RunMetadata) -> Result<(), SaveError> {
    write_json(&dir.join("metadata-small.json"), &metadata.summary())?;
    write_json(&dir.join("metadata.json"), metadata)
}

/// Writes metadata and data as pretty JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSaver;

impl RunSaver for JsonSaver {
    fn short_name(&self) -> &'static str {
        "json"
    }

    /// Writes the metadata and acquired data.
    fn save_run(
        &self,
        metadata: &RunMetadata,
        data: &RunData,
        ctx: &SaveContext,
    ) -> Result<(), SaveError> {
        let dir = ctx.ensure_directory()?;
        write_metadata(dir, metadata)?;
        write_json(&dir.join("raw_daq.json"), data)?;
        info!(
            run = %metadata.run_id,
            points = data.len(),
            dir = %dir.display(),
            "Saved run as json"
        );
        Ok(())
    }

    fn save_user_extras(&self, extras: &UserExtras, ctx: &SaveContext) -> Result<(), SaveError> {
        let dir = ctx.ensure_directory()?;
        for (name, value) in extras {
            match value {
                Some(value) => write_json(&dir.join(format!("{name}.json")), value)?,
                None => debug!(extra = %name, "skipping absent extra"),
            }
        }
        Ok(())
    }
}

/// Writes metadata as JSON and data as a CSV table.
#[cfg(feature = "storage_csv")]
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSaver;

#[cfg(feature = "storage_csv")]
impl RunSaver for CsvSaver {
    fn short_name(&self) -> &'static str {
        "csv"
    }

    /// Writes the metadata and acquired data.
    fn save_run(
        &self,
        metadata: &RunMetadata,
        data: &RunData,
        ctx: &SaveContext,
    ) -> Result<(), SaveError> {
        let dir = ctx.ensure_directory()?;
        write_metadata(dir, metadata)?;

        let mut writer = csv::Writer::from_path(dir.join("raw_daq.csv"))?;
        writer.write_record(["timestamp", "channel", "value", "unit", "metadata"])?;
        for dp in data.points() {
            let metadata_str = dp
                .metadata
                .as_ref()
                .map_or(String::new(), |v| v.to_string());
            writer.write_record(&[
                dp.timestamp.to_rfc3339(),
                dp.channel.clone(),
                dp.value.to_string(),
                dp.unit.clone(),
                metadata_str,
            ])?;
        }
        writer.flush()?;
        info!(
            run = %metadata.run_id,
            points = data.len(),
            dir = %dir.display(),
            "Saved run as csv"
        );
        Ok(())
    }

    fn save_user_extras(&self, extras: &UserExtras, ctx: &SaveContext) -> Result<(), SaveError> {
        // Extras are free-form, CSV has no shape for them.
        JsonSaver.save_user_extras(extras, ctx)
    }
}

/// Discards everything. Useful for dry runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForgetfulSaver;

impl RunSaver for ForgetfulSaver {
    fn short_name(&self) -> &'static str {
        "forget"
    }

    /// Writes the metadata and acquired data.
    fn save_run(
        &self,
        metadata: &RunMetadata,
        _data: &RunData,
        _ctx: &SaveContext,
    ) -> Result<(), SaveError> {
        debug!(run = %metadata.run_id, "forgetting run");
        Ok(())
    }

    fn save_user_extras(&self, _extras: &UserExtras, _ctx: &SaveContext) -> Result<(), SaveError> {
        Ok(())
    }
}
