//! Duration-based threshold state reduction.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use time::Duration;

use pyplyn_core::model::{format_number, Matrix, Transmutation};

use super::threshold::{change_value, StatusCode, ThresholdType};

/// Reduces each row of time-series points to a single status point based on
/// how long the threshold has been continuously met.
///
/// Scanning from the newest point backwards while the threshold matches:
/// a point at or before the critical horizon escalates to CRIT immediately;
/// points within the warn/info horizons arm those levels. The first
/// non-matching point breaks out with WARN, INFO, or OK depending on how far
/// back it sits. Empty rows are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdMetForDuration {
    pub threshold: f64,
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub critical_duration_millis: i64,
    #[serde(default)]
    pub warn_duration_millis: i64,
    #[serde(default)]
    pub info_duration_millis: i64,
}

impl PartialEq for ThresholdMetForDuration {
    fn eq(&self, other: &Self) -> bool {
        self.threshold == other.threshold
            && self.threshold_type == other.threshold_type
            && self.critical_duration_millis == other.critical_duration_millis
            && self.warn_duration_millis == other.warn_duration_millis
            && self.info_duration_millis == other.info_duration_millis
    }
}

impl Eq for ThresholdMetForDuration {}

impl Hash for ThresholdMetForDuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.threshold.to_bits().hash(state);
        self.threshold_type.hash(state);
        self.critical_duration_millis.hash(state);
        self.warn_duration_millis.hash(state);
        self.info_duration_millis.hash(state);
    }
}

impl ThresholdMetForDuration {
    pub fn apply(&self, input: Matrix) -> Matrix {
        input
            .into_iter()
            .filter_map(|row| self.apply_row(row))
            .collect()
    }

    fn apply_row(&self, points: Vec<Transmutation>) -> Option<Vec<Transmutation>> {
        let last = points.last()?.clone();
        let last_ts = last.time();

        let critical_ts = last_ts - Duration::milliseconds(self.critical_duration_millis);
        let warn_ts = last_ts - Duration::milliseconds(self.warn_duration_millis);
        let info_ts = last_ts - Duration::milliseconds(self.info_duration_millis);

        let mut at_warning_level = false;
        let mut at_info_level = false;

        for point in points.iter().rev() {
            let point_ts = point.time();

            if self.threshold_type.matches(point.value(), self.threshold) {
                if point_ts <= critical_ts {
                    return Some(vec![self.annotate(
                        change_value(&last, StatusCode::Crit.value()),
                        StatusCode::Crit,
                        self.critical_duration_millis,
                    )]);
                } else if point_ts <= warn_ts {
                    at_warning_level = true;
                } else if point_ts <= info_ts {
                    at_info_level = true;
                }
            } else {
                // the INFO breakout deliberately reports the warn duration
                let emitted = if point_ts <= warn_ts {
                    self.annotate(
                        change_value(point, StatusCode::Warn.value()),
                        StatusCode::Warn,
                        self.warn_duration_millis,
                    )
                } else if point_ts <= info_ts {
                    self.annotate(
                        change_value(point, StatusCode::Info.value()),
                        StatusCode::Info,
                        self.warn_duration_millis,
                    )
                } else {
                    change_value(point, StatusCode::Ok.value())
                };
                return Some(vec![emitted]);
            }
        }

        // the requested duration is longer than the available time series
        let emitted = if at_warning_level {
            self.annotate(
                change_value(&last, StatusCode::Warn.value()),
                StatusCode::Warn,
                self.warn_duration_millis,
            )
        } else if at_info_level {
            self.annotate(
                change_value(&last, StatusCode::Info.value()),
                StatusCode::Info,
                self.warn_duration_millis,
            )
        } else {
            change_value(&last, StatusCode::Ok.value())
        };
        Some(vec![emitted])
    }

    /// Appends the explanation of which threshold was hit and for how long.
    fn annotate(
        &self,
        point: Transmutation,
        code: StatusCode,
        duration_millis: i64,
    ) -> Transmutation {
        let message = format!(
            "{} threshold hit by {}, with value={} {} {:.2}, duration longer than {}",
            code.code(),
            point.name(),
            format_number(point.original_value()),
            self.threshold_type.as_str(),
            self.threshold,
            format_duration(duration_millis)
        );
        point.with_message(message)
    }
}

/// Renders a duration as `hh:mm:ss` components, prefixed with whole days
/// when present; sub-second remainders are omitted.
fn format_duration(milliseconds: i64) -> String {
    let total_seconds = milliseconds / 1000;
    let days = total_seconds / 86_400;
    let hours = (total_seconds / 3_600) % 24;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    let hms = format!("{hours:02}h:{minutes:02}m:{seconds:02}s");
    if days > 0 {
        format!("{days:02}days {hms}")
    } else {
        hms
    }
}
