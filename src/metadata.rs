//! Run metadata structures and handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Describes a single acquisition run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// The name of the experiment.
    pub experiment_name: String,
    /// A detailed description of the experiment.
    pub description: String,
    /// User-defined experimental parameters.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// User annotations or notes.
    pub annotations: String,
    /// Version of the data acquisition software.
    pub software_version: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            experiment_name: "Default Experiment".to_string(),
            description: String::new(),
            parameters: BTreeMap::new(),
            annotations: String::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }
}

/// The compact subset written next to the full metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataSummary {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Human-readable experiment name.
    pub experiment_name: String,
    /// Run start time.
    pub started_at: DateTime<Utc>,
}

/// A builder for constructing `RunMetadata` instances.
#[derive(Default)]
pub struct RunMetadataBuilder {
    inner: RunMetadata,
}

impl RunMetadataBuilder {
    /// Creates a builder from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the experiment name.
    pub fn experiment_name(mut self, name: &str) -> Self {
        self.inner.experiment_name = name.to_string();
        self
    }

    /// Sets the free-form description.
    pub fn description(mut self, description: &str) -> Self {
        self.inner.description = description.to_string();
        self
    }

    /// Adds or replaces an experiment parameter.
    pub fn parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.inner.parameters.insert(key.to_string(), value);
        self
    }

    /// Sets the operator annotations.
    pub fn annotations(mut self, annotations: &str) -> Self {
        self.inner.annotations = annotations.to_string();
        self
    }

    /// Overrides the start time (defaults to now).
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.inner.started_at = started_at;
        self
    }

    /// Finishes the metadata.
    pub fn build(self) -> RunMetadata {
        self.inner
    }
}

impl RunMetadata {
    /// Starts a builder from the defaults.
    pub fn builder() -> RunMetadataBuilder {
        RunMetadataBuilder::new()
    }

    /// Validates the metadata.
    pub fn validate(&self) -> Result<(), String> {
        if self.experiment_name.trim().is_empty() {
            return Err("Experiment name cannot be empty.".to_string());
        }
        if self.software_version.is_empty() {
            return Err("Software version cannot be empty.".to_string());
        }
        Ok(())
    }

    /// The compact summary of this run.
    pub fn summary(&self) -> MetadataSummary {
        MetadataSummary {
            run_id: self.run_id,
            experiment_name: self.experiment_name.clone(),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let metadata = RunMetadata::builder()
            .experiment_name("Beam alignment")
            .description("Scan the stage")
            .parameter("steps", json!(40))
            .annotations("first pass")
            .build();

        assert_eq!(metadata.experiment_name, "Beam alignment");
        assert_eq!(metadata.parameters["steps"], json!(40));
        assert_eq!(metadata.software_version, env!("CARGO_PKG_VERSION"));
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn empty_name_is_invalid() {
        let metadata = RunMetadata::builder().experiment_name("  ").build();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn runs_get_distinct_ids() {
        let a = RunMetadata::default();
        let b = RunMetadata::default();
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.summary().run_id, a.run_id);
    }
}
