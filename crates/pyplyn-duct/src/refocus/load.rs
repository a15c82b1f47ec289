//! Pushes transformed results to Refocus sinks.

use std::sync::Arc;

use futures::future::join_all;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use pyplyn_core::model::{format_number, Matrix};
use pyplyn_core::status::{MeterKind, SystemStatus};

use crate::connectors::AppConnectors;

use super::client::RefocusClient;
use super::model::{RefocusLoad, Sample};

/// Upserts the final matrix onto each declared Refocus destination.
///
/// Sinks run in parallel; each receives the full matrix and reports one
/// boolean outcome.
pub struct RefocusLoadProcessor {
    connectors: Arc<AppConnectors>,
    status: Arc<SystemStatus>,
}

impl RefocusLoadProcessor {
    pub fn new(connectors: Arc<AppConnectors>, status: Arc<SystemStatus>) -> Self {
        Self { connectors, status }
    }

    pub fn meter_name() -> &'static str {
        "RefocusLoad"
    }

    fn succeeded(&self) {
        self.status.meter(Self::meter_name(), MeterKind::Success).mark();
    }

    fn failed(&self) {
        self.status.meter(Self::meter_name(), MeterKind::Failure).mark();
    }

    fn authentication_failure(&self) {
        self.status
            .meter(Self::meter_name(), MeterKind::AuthenticationFailure)
            .mark();
    }

    /// Delivers `matrix` to every destination, returning one success flag
    /// per sink in input order.
    pub async fn process(&self, matrix: &Matrix, destinations: &[RefocusLoad]) -> Vec<bool> {
        join_all(
            destinations
                .iter()
                .map(|destination| self.push(matrix, destination)),
        )
        .await
    }

    async fn push(&self, matrix: &Matrix, destination: &RefocusLoad) -> bool {
        let (client, _cache) = match self
            .connectors
            .client_and_cache::<RefocusClient, Sample>(&destination.endpoint)
        {
            Ok(pair) => pair,
            Err(error) => {
                error!(endpoint = %destination.endpoint, %error, "no client available for sink");
                self.failed();
                return false;
            }
        };

        if let Err(error) = client.authenticate().await {
            self.authentication_failure();
            self.failed();
            warn!(endpoint = %destination.endpoint, %error, "authentication failed");
            return false;
        }

        let updated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .expect("UTC now must be RFC3339 formattable");

        let samples: Vec<Sample> = matrix
            .iter()
            .flatten()
            .map(|point| Sample {
                name: destination.name(),
                value: format_number(point.value()),
                updated_at: updated_at.clone(),
            })
            .collect();

        if samples.is_empty() {
            debug!(sink = %destination.id(), "nothing to deliver");
            return true;
        }

        match client.upsert_samples(&samples).await {
            Ok(true) => {
                self.succeeded();
                debug!(sink = %destination.id(), count = samples.len(), "delivered samples");
                true
            }
            Ok(false) => {
                self.failed();
                false
            }
            Err(error) => {
                warn!(sink = %destination.id(), %error, "sink rejected authentication");
                self.authentication_failure();
                self.failed();
                false
            }
        }
    }
}
