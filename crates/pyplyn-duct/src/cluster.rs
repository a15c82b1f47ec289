//! Cluster membership seam.
//!
//! The real membership backend is an external collaborator; this module
//! defines the contract the update manager depends on plus the degenerate
//! single-node implementation used when clustering is disabled.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::model::Configuration;

/// Master election plus a replicated configuration set.
///
/// Only the master runs the configuration loader each tick; slaves observe
/// the latest set through [`replicated`](Cluster::replicated).
pub trait Cluster: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn is_master(&self) -> bool;

    /// Replaces the replicated set with `configurations`.
    fn publish(&self, configurations: &HashSet<Configuration>);

    /// Latest replicated set, as observed by this node.
    fn replicated(&self) -> HashSet<Configuration>;
}

/// Degenerate single-node cluster: every node is master and the replicated
/// set is process-local.
#[derive(Debug, Default)]
pub struct LocalCluster {
    configurations: Mutex<HashSet<Configuration>>,
}

impl Cluster for LocalCluster {
    fn is_enabled(&self) -> bool {
        false
    }

    fn is_master(&self) -> bool {
        true
    }

    fn publish(&self, configurations: &HashSet<Configuration>) {
        let mut replicated = self
            .configurations
            .lock()
            .expect("replicated set lock poisoned");
        *replicated = configurations.clone();
    }

    fn replicated(&self) -> HashSet<Configuration> {
        self.configurations
            .lock()
            .expect("replicated set lock poisoned")
            .clone()
    }
}
