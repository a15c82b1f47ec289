//! # Pyplyn Duct
//!
//! The Pyplyn ETL service: a cluster-coordinated configuration reloader, a
//! per-configuration task scheduler, and the Extract/Transform/Load pipeline
//! engine with its Refocus protocol binding.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`appconfig`] | Application configuration read once at startup |
//! | [`cluster`] | Master election and replicated configuration set seam |
//! | [`connectors`] | Memoized per-endpoint client and cache factory |
//! | [`etl`] | Pipeline engine, task scheduler, configuration updates |
//! | [`model`] | Stage definitions and the declarative `Configuration` |
//! | [`refocus`] | Refocus client plus extract/load processors |
//! | [`transform`] | Value-level matrix transformations |

pub mod appconfig;
pub mod cluster;
pub mod connectors;
pub mod etl;
pub mod model;
pub mod refocus;
pub mod transform;

pub use appconfig::AppConfig;
pub use cluster::{Cluster, LocalCluster};
pub use connectors::AppConnectors;
pub use etl::configuration::{ConfigurationLoader, ConfigurationUpdateManager, FileConfigurationLoader};
pub use etl::engine::EtlEngine;
pub use etl::scheduler::TaskScheduler;
pub use model::{Configuration, Extract, Load, Transform};
