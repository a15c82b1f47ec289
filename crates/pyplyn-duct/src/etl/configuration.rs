//! Configuration loading and the cluster-coordinated update cycle.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info};

use pyplyn_core::error::ConfigError;
use pyplyn_core::shutdown::ShutdownSignal;

use crate::cluster::Cluster;
use crate::etl::scheduler::TaskScheduler;
use crate::model::Configuration;

/// Pluggable source of the full configuration set.
pub trait ConfigurationLoader: Send + Sync {
    fn load(&self) -> Result<HashSet<Configuration>, ConfigError>;
}

/// Loads configurations from a JSON file (an array of configurations) or a
/// directory of such files.
pub struct FileConfigurationLoader {
    path: PathBuf,
}

impl FileConfigurationLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_file(path: &Path) -> Result<Vec<Configuration>, ConfigError> {
        let raw = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl ConfigurationLoader for FileConfigurationLoader {
    fn load(&self) -> Result<HashSet<Configuration>, ConfigError> {
        let mut configurations = HashSet::new();

        if self.path.is_dir() {
            let entries = fs::read_dir(&self.path).map_err(|source| ConfigError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| ConfigError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
                let path = entry.path();
                if path.extension().is_some_and(|extension| extension == "json") {
                    configurations.extend(Self::load_file(&path)?);
                }
            }
        } else {
            configurations.extend(Self::load_file(&self.path)?);
        }

        Ok(configurations)
    }
}

/// Keeps the scheduled workload in sync with the configuration source.
///
/// Each tick the latest set is obtained (loaded and published on the master,
/// read from the replicated set on slaves), diffed against the currently
/// scheduled set by structural equality, and the scheduler is updated:
/// removed configurations are cancelled, added ones scheduled. A
/// configuration identical to one already scheduled is never re-scheduled.
pub struct ConfigurationUpdateManager {
    loader: Arc<dyn ConfigurationLoader>,
    scheduler: Arc<TaskScheduler>,
    cluster: Arc<dyn Cluster>,
    active: Mutex<HashSet<Configuration>>,
}

impl ConfigurationUpdateManager {
    pub fn new(
        loader: Arc<dyn ConfigurationLoader>,
        scheduler: Arc<TaskScheduler>,
        cluster: Arc<dyn Cluster>,
    ) -> Self {
        Self {
            loader,
            scheduler,
            cluster,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// One update tick.
    ///
    /// Load failures keep the current workload untouched; they are fatal only
    /// at startup, where the caller checks the initial set explicitly.
    pub fn run(&self) {
        let latest = if self.cluster.is_enabled() {
            if self.cluster.is_master() {
                match self.loader.load() {
                    Ok(latest) => {
                        self.cluster.publish(&latest);
                        latest
                    }
                    Err(load_error) => {
                        error!(%load_error, "configuration load failed; keeping current set");
                        return;
                    }
                }
            } else {
                // slaves never load; they observe what the master published
                self.cluster.replicated()
            }
        } else {
            match self.loader.load() {
                Ok(latest) => latest,
                Err(load_error) => {
                    error!(%load_error, "configuration load failed; keeping current set");
                    return;
                }
            }
        };

        self.apply(latest);
    }

    fn apply(&self, latest: HashSet<Configuration>) {
        let mut active = self.active.lock().expect("active set lock poisoned");

        let removed: Vec<Configuration> = active.difference(&latest).cloned().collect();
        let added: Vec<Configuration> = latest.difference(&active).cloned().collect();

        for configuration in &removed {
            self.scheduler.cancel(configuration);
        }
        for configuration in &added {
            self.scheduler.schedule(configuration.clone());
        }

        if !removed.is_empty() || !added.is_empty() {
            info!(
                added = added.len(),
                removed = removed.len(),
                total = latest.len(),
                "configuration set updated"
            );
        } else {
            debug!(total = latest.len(), "configuration set unchanged");
        }

        *active = latest;
    }

    /// The currently active configuration set.
    pub fn get(&self) -> HashSet<Configuration> {
        self.active.lock().expect("active set lock poisoned").clone()
    }

    /// Periodic update loop; ticks immediately, then on `interval`, until
    /// shutdown.
    pub async fn start(self: Arc<Self>, interval: Duration, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.draining() => break,

                _ = ticker.tick() => self.run(),
            }
        }
    }
}
