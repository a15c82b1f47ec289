//! Refocus wire and stage models.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use pyplyn_core::cache::Cacheable;

/// Raw measurement returned by the Refocus samples API.
///
/// `value` is a string on the wire; a value equal to
/// [`Sample::RESPONSE_TIMEOUT`] marks the sample as timed out upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub name: String,
    pub value: String,
    pub updated_at: String,
}

impl Sample {
    pub const RESPONSE_TIMEOUT: &'static str = "Timeout";

    pub fn is_timed_out(&self) -> bool {
        self.value == Self::RESPONSE_TIMEOUT
    }
}

impl Cacheable for Sample {
    fn cache_key(&self) -> String {
        self.name.clone()
    }
}

/// Refocus extract definition: pulls samples matching `subject|aspect` from
/// one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefocusExtract {
    pub endpoint: String,
    pub subject: String,
    pub aspect: String,
    /// How long fetched samples stay cached; 0 disables caching.
    #[serde(default)]
    pub cache_millis: i64,
    /// Synthesized when the remote has no (or only timed-out) data.
    #[serde(default)]
    pub default_value: Option<f64>,
}

impl Eq for RefocusExtract {}

impl Hash for RefocusExtract {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
        self.subject.hash(state);
        self.aspect.hash(state);
        self.cache_millis.hash(state);
        self.default_value.map(f64::to_bits).hash(state);
    }
}

impl RefocusExtract {
    /// Sample name pattern queried on the endpoint; may contain wildcards.
    pub fn name(&self) -> String {
        format!("{}|{}", self.subject, self.aspect)
    }

    /// Name with wildcard characters removed; identifies the one sample this
    /// extract emits.
    pub fn filtered_name(&self) -> String {
        self.name().replace('*', "")
    }

    pub fn cache_key(&self) -> String {
        self.filtered_name()
    }
}

/// Refocus load destination: upserts the matrix as samples on
/// `subject|aspect`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefocusLoad {
    pub endpoint: String,
    pub subject: String,
    pub aspect: String,
}

impl RefocusLoad {
    pub fn name(&self) -> String {
        format!("{}|{}", self.subject, self.aspect)
    }

    pub fn id(&self) -> String {
        self.name()
    }
}
