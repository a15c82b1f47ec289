//! Stage definitions and the declarative ETL configuration.
//!
//! Extract/Transform/Load are closed sum types: each variant carries its
//! payload and processors dispatch on the tag. The JSON representation is
//! internally tagged on `format`, matching the configuration source.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use pyplyn_core::model::Matrix;

use crate::refocus::{RefocusExtract, RefocusLoad};
use crate::transform::{InfoStatus, LastDatapoint, Threshold, ThresholdMetForDuration};

/// Extract stage definitions, dispatched to processors by variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum Extract {
    Refocus(RefocusExtract),
}

impl Extract {
    /// Endpoint this extract pulls from.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Refocus(extract) => &extract.endpoint,
        }
    }
}

/// Transform stage definitions; each is a pure, deterministic matrix
/// function applied in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum Transform {
    LastDatapoint(LastDatapoint),
    InfoStatus(InfoStatus),
    Threshold(Threshold),
    ThresholdMetForDuration(ThresholdMetForDuration),
}

impl Transform {
    pub fn apply(&self, input: Matrix) -> Matrix {
        match self {
            Self::LastDatapoint(transform) => transform.apply(input),
            Self::InfoStatus(transform) => transform.apply(input),
            Self::Threshold(transform) => transform.apply(input),
            Self::ThresholdMetForDuration(transform) => transform.apply(input),
        }
    }
}

/// Load stage definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum Load {
    Refocus(RefocusLoad),
}

impl Load {
    pub fn id(&self) -> String {
        match self {
            Self::Refocus(load) => load.id(),
        }
    }
}

/// A declarative ETL job: extracts, ordered transforms, loads, and repeat
/// policy.
///
/// Identity is structural: two configurations with identical content are the
/// same configuration. The scheduler keys tasks by [`Configuration::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub extracts: Vec<Extract>,
    #[serde(default)]
    pub transforms: Vec<Transform>,
    pub loads: Vec<Load>,
    pub repeat_interval_millis: i64,
    #[serde(default)]
    pub disabled: bool,
}

impl Configuration {
    /// Structural hash used as the scheduler key.
    pub fn key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Fixtures shared by unit and integration tests.
#[doc(hidden)]
pub mod test_support {
    use super::*;

    /// A minimal enabled configuration pulling one subject from `endpoint`.
    pub fn sample_configuration(endpoint: &str, repeat_interval_millis: i64) -> Configuration {
        Configuration {
            extracts: vec![Extract::Refocus(RefocusExtract {
                endpoint: endpoint.to_string(),
                subject: "usa.east.web".to_string(),
                aspect: "latency".to_string(),
                cache_millis: 0,
                default_value: None,
            })],
            transforms: vec![Transform::LastDatapoint(LastDatapoint {})],
            loads: vec![Load::Refocus(RefocusLoad {
                endpoint: endpoint.to_string(),
                subject: "usa.east.web".to_string(),
                aspect: "latency-status".to_string(),
            })],
            repeat_interval_millis,
            disabled: false,
        }
    }
}
