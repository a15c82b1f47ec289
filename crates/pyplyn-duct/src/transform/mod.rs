//! Value-level matrix transformations.
//!
//! Every transform is a pure function `Matrix -> Matrix`: deterministic,
//! side-effect-free, and `original_value`-preserving for every retained cell.

mod info_status;
mod last_datapoint;
mod threshold;
mod threshold_met_for_duration;

pub use info_status::InfoStatus;
pub use last_datapoint::LastDatapoint;
pub use threshold::{change_value, StatusCode, Threshold, ThresholdType};
pub use threshold_met_for_duration::ThresholdMetForDuration;
