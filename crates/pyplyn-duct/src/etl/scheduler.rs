//! Per-configuration periodic task scheduling.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pyplyn_core::shutdown::ShutdownSignal;

use crate::etl::engine::EtlEngine;
use crate::model::Configuration;

struct ScheduledTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One logical periodic task per active configuration.
///
/// Tasks fire immediately on registration and then every
/// `repeat_interval_millis`. A configuration that is disabled or has a
/// non-positive interval never fires. Runs of the same configuration never
/// overlap: the run is awaited inside its own task and missed ticks are
/// skipped, never queued. Cancellation stops the next tick and abandons any
/// in-flight run at its next checkpoint.
pub struct TaskScheduler {
    engine: Arc<EtlEngine>,
    shutdown: ShutdownSignal,
    run_once: bool,
    tasks: DashMap<u64, ScheduledTask>,
}

impl TaskScheduler {
    pub fn new(engine: Arc<EtlEngine>, shutdown: ShutdownSignal) -> Self {
        Self {
            engine,
            shutdown,
            run_once: false,
            tasks: DashMap::new(),
        }
    }

    /// In run-once mode every task executes a single run and exits.
    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    /// Registers a periodic task for `configuration`. Re-registering an
    /// identical configuration is a no-op.
    pub fn schedule(&self, configuration: Configuration) {
        let key = configuration.key();
        let key_hex = format!("{key:016x}");

        if configuration.disabled || configuration.repeat_interval_millis <= 0 {
            debug!(configuration = %key_hex, "configuration is not schedulable");
            return;
        }

        if self.tasks.contains_key(&key) {
            return;
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let engine = Arc::clone(&self.engine);
        let shutdown = self.shutdown.clone();
        let run_once = self.run_once;

        let handle = tokio::spawn(async move {
            let period = Duration::from_millis(configuration.repeat_interval_millis as u64);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = task_cancel.cancelled() => break,

                    _ = shutdown.draining() => break,

                    _ = ticker.tick() => {
                        // dropping the run future on cancellation abandons
                        // in-flight remote calls
                        tokio::select! {
                            biased;
                            _ = task_cancel.cancelled() => break,
                            _ = engine.run(&configuration, &task_cancel) => {}
                        }

                        if run_once {
                            break;
                        }
                    }
                }
            }
        });

        info!(configuration = %key_hex, "scheduled configuration");
        self.tasks.insert(key, ScheduledTask { cancel, handle });
    }

    /// Cancels the task for `configuration`; the next tick will not fire and
    /// any in-flight run stops at its next checkpoint.
    pub fn cancel(&self, configuration: &Configuration) {
        if let Some((key, task)) = self.tasks.remove(&configuration.key()) {
            task.cancel.cancel();
            info!(configuration = %format!("{key:016x}"), "cancelled configuration");
        }
    }

    pub fn is_scheduled(&self, configuration: &Configuration) -> bool {
        self.tasks.contains_key(&configuration.key())
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Awaits completion of every scheduled task. Pair with a shutdown
    /// initiation (or run-once mode) or this will wait forever.
    pub async fn drain(&self) {
        let keys: Vec<u64> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            if let Some((_, task)) = self.tasks.remove(&key) {
                let _ = task.handle.await;
            }
        }
    }
}
