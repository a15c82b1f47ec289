//! # Pyplyn Core
//!
//! Core contracts and domain types for the Pyplyn time-series ETL service.
//!
//! This crate provides the foundational components shared by every pipeline:
//!
//! - **Point-matrix data model** (`Transmutation`, `Matrix`) flowing through
//!   Extract/Transform/Load stages
//! - **Time-bounded sample cache** with lazy eviction and a periodic sweep
//! - **HTTP transport abstraction** with single-flight authentication and a
//!   401-retry policy for concrete service clients
//! - **Connector registry** with secure on-demand password reads
//! - **SystemStatus** meters and timers plus a threshold-driven alert monitor
//! - **ShutdownSignal** observed at every stage boundary

pub mod cache;
pub mod client;
pub mod connector;
pub mod error;
pub mod model;
pub mod shutdown;
pub mod status;

// Re-export commonly used types at crate root for convenience

pub use cache::{run_sweeper, Cache, Cacheable};
pub use client::{
    AuthLatch, BoxFuture, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    NoopTransport, RemoteClient, ReqwestTransport,
};
pub use connector::{read_password_bytes, Connector, ConnectorRegistry};
pub use error::{ClientError, ConfigError};
pub use model::{format_number, Matrix, Metadata, Transmutation};
pub use shutdown::ShutdownSignal;
pub use status::{Meter, MeterKind, StatusAlert, StatusMonitor, SystemStatus, TimerContext};
