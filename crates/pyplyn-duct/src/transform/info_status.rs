//! Forces at least a status of INFO where the status is currently OK.

use serde::{Deserialize, Serialize};

use pyplyn_core::model::Matrix;

/// Remaps every cell whose integral value is 0 (OK) to 1 (INFO); all other
/// cells pass through unchanged.
///
/// Apply after a threshold transform, or only when input values are already
/// in the 0-3 status range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfoStatus {}

impl InfoStatus {
    pub fn apply(&self, input: Matrix) -> Matrix {
        input
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|point| {
                        if point.int_value() == 0 {
                            point.with_value(1.0)
                        } else {
                            point
                        }
                    })
                    .collect()
            })
            .collect()
    }
}
