//! Pyplyn service entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pyplyn_core::connector::ConnectorRegistry;
use pyplyn_core::error::ConfigError;
use pyplyn_core::shutdown::ShutdownSignal;
use pyplyn_core::status::{StatusMonitor, SystemStatus};

use pyplyn_duct::appconfig::AppConfig;
use pyplyn_duct::cluster::{Cluster, LocalCluster};
use pyplyn_duct::connectors::AppConnectors;
use pyplyn_duct::etl::configuration::{
    ConfigurationLoader, ConfigurationUpdateManager, FileConfigurationLoader,
};
use pyplyn_duct::etl::engine::EtlEngine;
use pyplyn_duct::etl::scheduler::TaskScheduler;
use pyplyn_duct::refocus::{RefocusExtractProcessor, RefocusLoadProcessor};

/// Pyplyn - a scalable time-series ETL service.
///
/// Periodically pulls metric samples from monitoring endpoints, applies
/// value-level transformations, and pushes the results to one or more sinks.
#[derive(Debug, Parser)]
#[command(name = "pyplyn", version, about = "Scalable time-series ETL service")]
struct Cli {
    /// Path to the application configuration file.
    #[arg(long, default_value = "config/pyplyn-config.json")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(&cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(cli: &Cli) -> Result<(), ConfigError> {
    let app_config = AppConfig::load(&cli.config)?;
    let registry = ConnectorRegistry::load(&app_config.global.connectors_path)?;
    info!(
        config = %cli.config.display(),
        connectors = registry.len(),
        "pyplyn starting"
    );

    let shutdown = ShutdownSignal::new();
    let status = Arc::new(SystemStatus::new());

    if app_config.alert.enabled {
        let monitor = StatusMonitor::new(
            Arc::clone(&status),
            app_config.alert.thresholds.clone(),
            Duration::from_millis(app_config.alert.check_interval_millis.max(1) as u64),
        );
        tokio::spawn(monitor.run(shutdown.clone()));
    }

    let connectors = Arc::new(AppConnectors::new(registry, shutdown.clone()));
    let engine = Arc::new(EtlEngine::new(
        RefocusExtractProcessor::new(
            Arc::clone(&connectors),
            shutdown.clone(),
            Arc::clone(&status),
        ),
        RefocusLoadProcessor::new(Arc::clone(&connectors), Arc::clone(&status)),
        Arc::clone(&status),
        shutdown.clone(),
    ));

    let scheduler = Arc::new(
        TaskScheduler::new(engine, shutdown.clone()).with_run_once(app_config.global.run_once),
    );

    if app_config.hazelcast.enabled {
        // the membership backend is deployed separately; without it this
        // node runs as a single-node master
        warn!("cluster membership backend not bundled; running as single-node master");
    }
    let cluster: Arc<dyn Cluster> = Arc::new(LocalCluster::default());

    let loader = Arc::new(FileConfigurationLoader::new(
        app_config.global.configurations_path.clone(),
    ));
    // a load failure at startup is fatal; later reload failures only log
    let initial = loader.load()?;
    info!(configurations = initial.len(), "initial configuration set loaded");

    let manager = Arc::new(ConfigurationUpdateManager::new(
        loader,
        Arc::clone(&scheduler),
        cluster,
    ));

    if app_config.global.run_once {
        manager.run();
        scheduler.drain().await;
        info!("run-once cycle completed");
        return Ok(());
    }

    let interval =
        Duration::from_millis(app_config.global.update_configuration_interval_millis.max(1) as u64);
    let updates = tokio::spawn(Arc::clone(&manager).start(interval, shutdown.clone()));

    tokio::signal::ctrl_c().await.map_err(|source| ConfigError::Io {
        path: "signal handler".to_string(),
        source,
    })?;
    info!("shutdown requested; draining");
    shutdown.initiate();

    let _ = updates.await;
    scheduler.drain().await;
    info!("shutdown complete");

    Ok(())
}
