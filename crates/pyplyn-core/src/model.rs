//! Point-matrix data model shared by all pipeline stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Ordered per-point annotations carried through the pipeline.
///
/// Messages accumulate in append order; tags hold scalar context such as the
/// originating endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Immutable measurement flowing through an ETL pipeline.
///
/// `original_value` is set once by the extract processor that created the
/// point and survives every downstream transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmutation {
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    name: String,
    value: f64,
    original_value: f64,
    #[serde(default)]
    metadata: Metadata,
}

impl Transmutation {
    pub fn new(
        time: OffsetDateTime,
        name: impl Into<String>,
        value: f64,
        original_value: f64,
        metadata: Metadata,
    ) -> Self {
        Self {
            time,
            name: name.into(),
            value,
            original_value,
            metadata,
        }
    }

    pub fn time(&self) -> OffsetDateTime {
        self.time
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Truncated value, used by transforms that treat values as statuses.
    pub fn int_value(&self) -> i64 {
        self.value as i64
    }

    pub fn original_value(&self) -> f64 {
        self.original_value
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns a copy carrying `value`; time, name, original value, and
    /// metadata are preserved.
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// Returns a copy with `message` appended to the metadata.
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        let mut point = self.clone();
        point.metadata.messages.push(message.into());
        point
    }
}

/// Ordered rows of ordered points; the unit of data flowing through a
/// pipeline. Each row corresponds to one extract definition; columns are
/// samples ordered by time ascending.
pub type Matrix = Vec<Vec<Transmutation>>;

/// Renders a numeric value the way it appears in sink payloads and alert
/// messages: integral values without a fractional part, everything else with
/// at most two decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{value:.2}");
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}
