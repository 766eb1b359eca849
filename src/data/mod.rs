//! Acquired data and its persistence backends.
pub mod storage;
pub mod storage_factory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single data point captured from an instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// When the point was acquired.
    pub timestamp: DateTime<Utc>,
    /// Source channel, e.g. an instrument name.
    pub channel: String,
    /// Measured value.
    pub value: f64,
    /// Unit of `value`.
    pub unit: String,
    /// Optional metadata for this specific data point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl DataPoint {
    /// Creates a point stamped with the current time.
    pub fn new(channel: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            channel: channel.into(),
            value,
            unit: unit.into(),
            metadata: None,
        }
    }
}

/// The points acquired during one run, in acquisition order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunData {
    points: Vec<DataPoint>,
}

impl RunData {
    /// Creates an empty run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a point.
    pub fn push(&mut self, point: DataPoint) {
        self.points.push(point);
    }

    /// All points in acquisition order.
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points recorded on `channel`, in order.
    pub fn channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a DataPoint> + 'a {
        self.points.iter().filter(move |p| p.channel == channel)
    }
}

impl FromIterator<DataPoint> for RunData {
    fn from_iter<I: IntoIterator<Item = DataPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
