//! Single-shot Extract/Transform/Load pipeline execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use pyplyn_core::model::Matrix;
use pyplyn_core::shutdown::ShutdownSignal;
use pyplyn_core::status::SystemStatus;

use crate::model::{Configuration, Extract, Load};
use crate::refocus::{RefocusExtract, RefocusExtractProcessor, RefocusLoad, RefocusLoadProcessor};

/// Runs one configuration through its declared stages.
///
/// Extracts are dispatched to processors by variant and their rows
/// concatenated in declared order; transforms apply in declared order; every
/// load receives the final matrix. Repetition is the scheduler's concern;
/// one call is one run. Shutdown and per-task cancellation are observed at
/// every stage boundary.
pub struct EtlEngine {
    extract: RefocusExtractProcessor,
    load: RefocusLoadProcessor,
    status: Arc<SystemStatus>,
    shutdown: ShutdownSignal,
}

impl EtlEngine {
    pub fn new(
        extract: RefocusExtractProcessor,
        load: RefocusLoadProcessor,
        status: Arc<SystemStatus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            extract,
            load,
            status,
            shutdown,
        }
    }

    /// Executes one pipeline run, timed per configuration.
    pub async fn run(&self, configuration: &Configuration, cancelled: &CancellationToken) {
        let key = format!("{:016x}", configuration.key());
        let _timer = self.status.timer("pipeline", &key);

        if self.halted(cancelled) {
            return;
        }

        let refocus_extracts: Vec<RefocusExtract> = configuration
            .extracts
            .iter()
            .map(|extract| match extract {
                Extract::Refocus(refocus) => refocus.clone(),
            })
            .collect();
        let mut matrix: Matrix = self.extract.process(&refocus_extracts).await;

        for transform in &configuration.transforms {
            if self.halted(cancelled) {
                return;
            }
            matrix = transform.apply(matrix);
        }

        if self.halted(cancelled) {
            return;
        }

        let refocus_loads: Vec<RefocusLoad> = configuration
            .loads
            .iter()
            .map(|load| match load {
                Load::Refocus(refocus) => refocus.clone(),
            })
            .collect();
        let outcomes = self.load.process(&matrix, &refocus_loads).await;

        debug!(
            configuration = %key,
            rows = matrix.len(),
            sinks = outcomes.len(),
            delivered = outcomes.iter().filter(|ok| **ok).count(),
            "pipeline run completed"
        );
    }

    fn halted(&self, cancelled: &CancellationToken) -> bool {
        self.shutdown.is_draining() || cancelled.is_cancelled()
    }
}
