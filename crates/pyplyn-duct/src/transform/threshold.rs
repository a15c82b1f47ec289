//! Graded threshold checks against critical/warn/info levels.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use pyplyn_core::model::{Matrix, Transmutation};

/// Predefined status values carried as cell values after grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    Ok,
    Info,
    Warn,
    Crit,
}

impl StatusCode {
    pub const fn value(self) -> f64 {
        match self {
            Self::Ok => 0.0,
            Self::Info => 1.0,
            Self::Warn => 2.0,
            Self::Crit => 3.0,
        }
    }

    /// Short code used in alert messages.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Crit => "CRIT",
        }
    }
}

/// Direction of the threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdType {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl ThresholdType {
    pub fn matches(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::EqualTo => value == threshold,
        }
    }

    /// Name used in alert messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::EqualTo => "EQUAL_TO",
        }
    }
}

/// Returns a copy of `point` carrying `value`; timestamp and original value
/// are preserved.
pub fn change_value(point: &Transmutation, value: f64) -> Transmutation {
    point.with_value(value)
}

/// Grades every cell against up to three threshold levels under one
/// comparison direction; the most severe matching level wins, otherwise the
/// cell becomes OK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub critical_threshold: Option<f64>,
    #[serde(default)]
    pub warn_threshold: Option<f64>,
    #[serde(default)]
    pub info_threshold: Option<f64>,
}

impl Eq for Threshold {}

impl Hash for Threshold {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.threshold_type.hash(state);
        self.critical_threshold.map(f64::to_bits).hash(state);
        self.warn_threshold.map(f64::to_bits).hash(state);
        self.info_threshold.map(f64::to_bits).hash(state);
    }
}

impl Threshold {
    pub fn apply(&self, input: Matrix) -> Matrix {
        input
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|point| {
                        let status = self.status_of(point.value());
                        change_value(&point, status.value())
                    })
                    .collect()
            })
            .collect()
    }

    /// Most severe status whose level matches `value`.
    pub fn status_of(&self, value: f64) -> StatusCode {
        let matched = |level: Option<f64>| {
            level.is_some_and(|threshold| self.threshold_type.matches(value, threshold))
        };

        if matched(self.critical_threshold) {
            StatusCode::Crit
        } else if matched(self.warn_threshold) {
            StatusCode::Warn
        } else if matched(self.info_threshold) {
            StatusCode::Info
        } else {
            StatusCode::Ok
        }
    }
}
