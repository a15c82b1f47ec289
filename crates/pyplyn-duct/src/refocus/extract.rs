//! Queries sample data from Refocus endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, error, info, warn};

use pyplyn_core::cache::Cache;
use pyplyn_core::Cacheable;
use pyplyn_core::model::{format_number, Matrix, Metadata, Transmutation};
use pyplyn_core::shutdown::ShutdownSignal;
use pyplyn_core::status::{MeterKind, SystemStatus};

use crate::connectors::AppConnectors;

use super::client::RefocusClient;
use super::model::{RefocusExtract, Sample};

/// Pulls samples for a batch of Refocus extract definitions and converts
/// them into matrix rows.
///
/// Work is partitioned by endpoint and endpoints run in parallel; within one
/// endpoint, rows come out in the declared extract order. Ordering between
/// endpoints is unspecified.
pub struct RefocusExtractProcessor {
    connectors: Arc<AppConnectors>,
    shutdown: ShutdownSignal,
    status: Arc<SystemStatus>,
}

impl RefocusExtractProcessor {
    pub fn new(
        connectors: Arc<AppConnectors>,
        shutdown: ShutdownSignal,
        status: Arc<SystemStatus>,
    ) -> Self {
        Self {
            connectors,
            shutdown,
            status,
        }
    }

    pub fn meter_name() -> &'static str {
        "Refocus"
    }

    fn succeeded(&self) {
        self.status.meter(Self::meter_name(), MeterKind::Success).mark();
    }

    fn failed(&self) {
        self.status.meter(Self::meter_name(), MeterKind::Failure).mark();
    }

    fn no_data(&self) {
        self.status.meter(Self::meter_name(), MeterKind::NoData).mark();
    }

    fn authentication_failure(&self) {
        self.status
            .meter(Self::meter_name(), MeterKind::AuthenticationFailure)
            .mark();
    }

    /// Processes the extract definitions and returns their matrix rows, one
    /// single-column row per definition that produced data.
    pub async fn process(&self, extracts: &[RefocusExtract]) -> Matrix {
        let mut by_endpoint: HashMap<String, Vec<RefocusExtract>> = HashMap::new();
        for extract in extracts {
            by_endpoint
                .entry(extract.endpoint.clone())
                .or_default()
                .push(extract.clone());
        }

        let endpoint_rows = join_all(
            by_endpoint
                .into_iter()
                .map(|(endpoint_id, group)| self.process_endpoint(endpoint_id, group)),
        )
        .await;

        endpoint_rows.into_iter().flatten().collect()
    }

    async fn process_endpoint(
        &self,
        endpoint_id: String,
        group: Vec<RefocusExtract>,
    ) -> Vec<Vec<Transmutation>> {
        let (client, cache) = match self
            .connectors
            .client_and_cache::<RefocusClient, Sample>(&endpoint_id)
        {
            Ok(pair) => pair,
            Err(error) => {
                error!(%endpoint_id, %error, "no client available for endpoint");
                self.failed();
                return Vec::new();
            }
        };

        if let Err(error) = client.authenticate().await {
            self.authentication_failure();
            self.failed();
            warn!(%endpoint_id, %error, "authentication failed");
            return Vec::new();
        }

        let mut rows = Vec::new();
        for extract in &group {
            if let Some(result) = self.process_extract(extract, &endpoint_id, &client, &cache).await
            {
                rows.push(vec![result]);
            }
        }
        rows
    }

    async fn process_extract(
        &self,
        extract: &RefocusExtract,
        endpoint_id: &str,
        client: &RefocusClient,
        cache: &Cache<Sample>,
    ) -> Option<Transmutation> {
        let mut is_default = false;

        let sample = match cache.get(&extract.cache_key()).await {
            Some(sample) => {
                debug!(name = %sample.name, %endpoint_id, "sample loaded from cache");
                sample
            }
            None => {
                // short circuit if the app is draining
                if self.shutdown.is_draining() {
                    return None;
                }

                let samples = {
                    let _timer = self
                        .status
                        .timer(Self::meter_name(), &format!("get-samples.{endpoint_id}"));
                    match client.get_samples(&extract.name()).await {
                        Ok(samples) => samples,
                        Err(error) => {
                            // auth retry already ran and failed again
                            error!(
                                %endpoint_id,
                                name = %extract.name(),
                                %error,
                                "could not complete sample request"
                            );
                            self.authentication_failure();
                            self.failed();
                            return None;
                        }
                    }
                };

                if samples.is_empty() {
                    self.failed();
                    return None;
                }

                if extract.cache_millis > 0 {
                    let mut cached = 0usize;
                    for sample in &samples {
                        if !sample.is_timed_out() {
                            cache.put(sample.clone(), extract.cache_millis).await;
                            cached += 1;
                        }
                    }
                    info!(cached, name = %extract.name(), %endpoint_id, "cached samples");
                }

                let selected = samples
                    .into_iter()
                    .find(|sample| sample.cache_key() == extract.cache_key());

                let needs_default =
                    selected.as_ref().map_or(true, Sample::is_timed_out);
                match (needs_default, extract.default_value) {
                    (true, Some(default_value)) => {
                        let sample = Sample {
                            name: extract.filtered_name(),
                            value: format_number(default_value),
                            updated_at: utc_now_rfc3339(),
                        };
                        info!(
                            name = %sample.name,
                            value = %sample.value,
                            %endpoint_id,
                            "default data provided for sample"
                        );
                        is_default = true;
                        sample
                    }
                    _ => match selected {
                        Some(sample) => sample,
                        None => {
                            error!(
                                name = %extract.filtered_name(),
                                %endpoint_id,
                                "no data for sample; null response"
                            );
                            self.no_data();
                            return None;
                        }
                    },
                }
            }
        };

        let result = match self.create_result(&sample, endpoint_id) {
            Some(result) => result,
            None => {
                self.failed();
                return None;
            }
        };

        let result = if is_default {
            result.with_message(default_value_message(
                &extract.name(),
                extract.default_value.unwrap_or_default(),
            ))
        } else {
            result
        };

        self.succeeded();
        info!(name = %extract.name(), %endpoint_id, "loaded data for sample");
        Some(result)
    }

    /// Converts a raw sample into a pipeline point.
    ///
    /// Returns `None` when the timestamp or the value cannot be parsed; both
    /// paths mark the no-data meter.
    fn create_result(&self, sample: &Sample, endpoint_id: &str) -> Option<Transmutation> {
        let time = match OffsetDateTime::parse(&sample.updated_at, &Rfc3339) {
            Ok(time) => time.to_offset(UtcOffset::UTC),
            Err(error) => {
                warn!(name = %sample.name, %endpoint_id, %error, "no data; invalid time");
                self.no_data();
                return None;
            }
        };

        let value = match sample.value.parse::<f64>() {
            Ok(value) => value,
            Err(error) => {
                if sample.is_timed_out() {
                    warn!(name = %sample.name, %endpoint_id, "no data; timed out");
                } else {
                    warn!(name = %sample.name, %endpoint_id, %error, "no data; invalid value");
                }
                self.no_data();
                return None;
            }
        };

        Some(Transmutation::new(
            time,
            sample.name.clone(),
            value,
            value,
            Metadata::default(),
        ))
    }
}

fn utc_now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("UTC now must be RFC3339 formattable")
}

/// Standardized message appended when an extract fell back to its default.
fn default_value_message(name: &str, value: f64) -> String {
    format!("Default value used for {name}={}", format_number(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::AppConnectors;
    use pyplyn_core::client::{
        BoxFuture, HttpError, HttpRequest, HttpResponse, HttpTransport, RemoteClient,
    };
    use pyplyn_core::connector::ConnectorRegistry;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Transport scripted per URL substring; counts auth exchanges.
    struct ScriptedTransport {
        routes: Mutex<Vec<(String, Vec<HttpResponse>)>>,
        auth_exchanges: AtomicUsize,
        sample_requests: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                routes: Mutex::new(Vec::new()),
                auth_exchanges: AtomicUsize::new(0),
                sample_requests: AtomicUsize::new(0),
            }
        }

        fn route(self, url_part: &str, responses: Vec<HttpResponse>) -> Self {
            self.routes
                .lock()
                .expect("routes lock")
                .push((url_part.to_string(), responses));
            self
        }

        fn auth_count(&self) -> usize {
            self.auth_exchanges.load(Ordering::SeqCst)
        }

        fn sample_request_count(&self) -> usize {
            self.sample_requests.load(Ordering::SeqCst)
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                if request.url.contains("authenticate") {
                    self.auth_exchanges.fetch_add(1, Ordering::SeqCst);
                    return Ok(HttpResponse::ok_json(r#"{"token": "t-1"}"#));
                }
                if request.url.contains("samples?") {
                    self.sample_requests.fetch_add(1, Ordering::SeqCst);
                }

                let mut routes = self.routes.lock().expect("routes lock");
                for (url_part, responses) in routes.iter_mut() {
                    if request.url.contains(url_part.as_str()) {
                        if responses.len() > 1 {
                            return Ok(responses.remove(0));
                        }
                        return Ok(responses
                            .first()
                            .cloned()
                            .unwrap_or_else(|| HttpResponse::ok_json("[]")));
                    }
                }
                Ok(HttpResponse::ok_json("[]"))
            })
        }
    }

    struct Fixture {
        _file: NamedTempFile,
        transport: Arc<ScriptedTransport>,
        connectors: Arc<AppConnectors>,
        status: Arc<SystemStatus>,
        shutdown: ShutdownSignal,
    }

    impl Fixture {
        fn new(transport: ScriptedTransport) -> Self {
            let mut file = NamedTempFile::new().expect("temp file");
            file.write_all(
                br#"[{"id": "refocus-prod", "endpoint": "https://refocus.test", "username": "svc", "password": "cHc="}]"#,
            )
            .expect("write fixture");
            let registry = ConnectorRegistry::load(file.path()).expect("registry should load");

            let transport = Arc::new(transport);
            let shutdown = ShutdownSignal::new();
            let factory_transport = Arc::clone(&transport);
            let connectors = Arc::new(AppConnectors::with_transport_factory(
                registry,
                Arc::new(move |_: &pyplyn_core::connector::Connector| {
                    Ok(Arc::clone(&factory_transport) as Arc<dyn HttpTransport>)
                }),
                shutdown.clone(),
            ));

            Self {
                _file: file,
                transport,
                connectors,
                status: Arc::new(SystemStatus::new()),
                shutdown,
            }
        }

        fn processor(&self) -> RefocusExtractProcessor {
            RefocusExtractProcessor::new(
                Arc::clone(&self.connectors),
                self.shutdown.clone(),
                Arc::clone(&self.status),
            )
        }

        fn meter_count(&self, kind: MeterKind) -> u64 {
            self.status
                .meter(RefocusExtractProcessor::meter_name(), kind)
                .count()
        }
    }

    fn extract(cache_millis: i64, default_value: Option<f64>) -> RefocusExtract {
        RefocusExtract {
            endpoint: "refocus-prod".to_string(),
            subject: "usa.east.web".to_string(),
            aspect: "latency".to_string(),
            cache_millis,
            default_value,
        }
    }

    const SAMPLES: &str = r#"[
        {"name": "usa.east.web|latency", "value": "12.5", "updatedAt": "2024-01-01T00:00:00Z"},
        {"name": "usa.west.web|latency", "value": "9.0", "updatedAt": "2024-01-01T00:00:00Z"}
    ]"#;

    #[tokio::test]
    async fn emits_one_single_column_row_per_extract() {
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(SAMPLES)]),
        );

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].len(), 1);
        let point = &matrix[0][0];
        assert_eq!(point.name(), "usa.east.web|latency");
        assert_eq!(point.value(), 12.5);
        assert_eq!(point.original_value(), 12.5);
        assert_eq!(fixture.meter_count(MeterKind::Success), 1);
    }

    #[tokio::test]
    async fn empty_remote_response_marks_failed_and_yields_no_row() {
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json("[]")]),
        );

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert!(matrix.is_empty());
        assert_eq!(fixture.meter_count(MeterKind::Failure), 1);
    }

    #[tokio::test]
    async fn no_caching_when_cache_millis_is_zero() {
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(SAMPLES)]),
        );
        let processor = fixture.processor();

        processor.process(&[extract(0, None)]).await;
        processor.process(&[extract(0, None)]).await;

        // every run hit the remote: nothing was cached
        assert_eq!(fixture.transport.sample_request_count(), 2);
    }

    #[tokio::test]
    async fn cached_samples_short_circuit_the_remote_call() {
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(SAMPLES)]),
        );
        let processor = fixture.processor();

        processor.process(&[extract(60_000, None)]).await;
        processor.process(&[extract(60_000, None)]).await;

        assert_eq!(fixture.transport.sample_request_count(), 1);
        assert_eq!(fixture.meter_count(MeterKind::Success), 2);
    }

    #[tokio::test]
    async fn timed_out_sample_with_default_synthesizes_flagged_row() {
        let samples = r#"[{"name": "usa.east.web|latency", "value": "Timeout", "updatedAt": "2024-01-01T00:00:00Z"}]"#;
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(samples)]),
        );

        let matrix = fixture.processor().process(&[extract(0, Some(42.0))]).await;

        assert_eq!(matrix.len(), 1);
        let point = &matrix[0][0];
        assert_eq!(point.value(), 42.0);
        assert_eq!(
            point.metadata().messages,
            vec!["Default value used for usa.east.web|latency=42"]
        );
        assert_eq!(fixture.meter_count(MeterKind::Success), 1);
    }

    #[tokio::test]
    async fn timed_out_sample_without_default_marks_no_data() {
        let samples = r#"[{"name": "usa.east.web|latency", "value": "Timeout", "updatedAt": "2024-01-01T00:00:00Z"}]"#;
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(samples)]),
        );

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert!(matrix.is_empty());
        assert_eq!(fixture.meter_count(MeterKind::NoData), 1);
    }

    #[tokio::test]
    async fn unparseable_time_marks_no_data() {
        let samples = r#"[{"name": "usa.east.web|latency", "value": "1.0", "updatedAt": "not-a-time"}]"#;
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(samples)]),
        );

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert!(matrix.is_empty());
        assert_eq!(fixture.meter_count(MeterKind::NoData), 1);
    }

    #[tokio::test]
    async fn auth_retry_after_401_succeeds_transparently() {
        let fixture = Fixture::new(ScriptedTransport::new().route(
            "samples?",
            vec![
                HttpResponse::with_status(401, "expired"),
                HttpResponse::ok_json(SAMPLES),
            ],
        ));

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert_eq!(matrix.len(), 1);
        // initial authenticate plus the re-auth triggered by the 401
        assert_eq!(fixture.transport.auth_count(), 2);
        assert_eq!(fixture.meter_count(MeterKind::Success), 1);
    }

    #[tokio::test]
    async fn second_401_marks_failure_and_yields_no_row() {
        let fixture = Fixture::new(ScriptedTransport::new().route(
            "samples?",
            vec![
                HttpResponse::with_status(401, "expired"),
                HttpResponse::with_status(401, "still expired"),
            ],
        ));

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert!(matrix.is_empty());
        assert_eq!(fixture.meter_count(MeterKind::AuthenticationFailure), 1);
        assert_eq!(fixture.meter_count(MeterKind::Failure), 1);
    }

    #[tokio::test]
    async fn draining_shutdown_yields_no_rows() {
        let fixture = Fixture::new(
            ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(SAMPLES)]),
        );
        fixture.shutdown.initiate();

        let matrix = fixture.processor().process(&[extract(0, None)]).await;

        assert!(matrix.is_empty());
        assert_eq!(fixture.transport.sample_request_count(), 0);
    }

    #[tokio::test]
    async fn per_endpoint_grouping_matches_separate_runs() {
        let run = |extracts: Vec<RefocusExtract>| async move {
            let fixture = Fixture::new(
                ScriptedTransport::new().route("samples?", vec![HttpResponse::ok_json(SAMPLES)]),
            );
            fixture.processor().process(&extracts).await
        };

        let mut second = extract(0, None);
        second.subject = "usa.west.web".to_string();

        let combined = run(vec![extract(0, None), second.clone()]).await;
        let mut separate = run(vec![extract(0, None)]).await;
        separate.extend(run(vec![second]).await);

        assert_eq!(combined, separate);
    }
}
