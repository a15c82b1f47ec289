//! Filters out all but the last data point of every row.

use serde::{Deserialize, Serialize};

use pyplyn_core::model::Matrix;

/// Reduces an E x N matrix to E x 1 by keeping each row's newest point.
/// Empty rows are dropped; row order is preserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LastDatapoint {}

impl LastDatapoint {
    pub fn apply(&self, input: Matrix) -> Matrix {
        input
            .into_iter()
            .filter_map(|row| row.into_iter().last().map(|point| vec![point]))
            .collect()
    }
}
