//! Shared fixtures for behavior tests: a scripted HTTP transport and a fully
//! wired service stack backed by it.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use pyplyn_core::client::{BoxFuture, HttpError, HttpRequest, HttpResponse, HttpTransport};
use pyplyn_core::connector::ConnectorRegistry;
use pyplyn_core::shutdown::ShutdownSignal;
use pyplyn_core::status::SystemStatus;

use pyplyn_duct::connectors::AppConnectors;
use pyplyn_duct::etl::engine::EtlEngine;
use pyplyn_duct::etl::scheduler::TaskScheduler;
use pyplyn_duct::refocus::{RefocusExtractProcessor, RefocusLoadProcessor};

/// In-memory Refocus endpoint: authenticates everything, serves a scripted
/// samples payload, and records upserted bodies.
#[derive(Default)]
pub struct FakeRefocus {
    pub samples_body: Mutex<String>,
    pub upserts: Mutex<Vec<String>>,
    pub auth_exchanges: AtomicUsize,
    pub sample_requests: AtomicUsize,
}

impl FakeRefocus {
    pub fn serving(samples_body: &str) -> Self {
        Self {
            samples_body: Mutex::new(samples_body.to_string()),
            ..Default::default()
        }
    }

    pub fn auth_count(&self) -> usize {
        self.auth_exchanges.load(Ordering::SeqCst)
    }

    pub fn upserted(&self) -> Vec<String> {
        self.upserts.lock().expect("upserts lock").clone()
    }
}

impl HttpTransport for FakeRefocus {
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
                let body = self.samples_body.lock().expect("samples lock").clone();
                return Ok(HttpResponse::ok_json(body));
            }
            if request.url.contains("upsert") {
                self.upserts
                    .lock()
                    .expect("upserts lock")
                    .push(request.body.unwrap_or_default());
                return Ok(HttpResponse::ok_json("{}"));
            }
            Ok(HttpResponse::ok_json("{}"))
        })
    }
}

/// A wired service stack (connectors, engine, scheduler) talking to one
/// [`FakeRefocus`] endpoint registered as `refocus-prod`.
pub struct Stack {
    _connectors_file: NamedTempFile,
    pub refocus: Arc<FakeRefocus>,
    pub connectors: Arc<AppConnectors>,
    pub status: Arc<SystemStatus>,
    pub shutdown: ShutdownSignal,
    pub scheduler: Arc<TaskScheduler>,
}

impl Stack {
    pub fn new(refocus: FakeRefocus) -> Self {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"[{"id": "refocus-prod", "endpoint": "https://refocus.test", "username": "svc", "password": "cHc="}]"#,
        )
        .expect("write connectors fixture");
        let registry = ConnectorRegistry::load(file.path()).expect("registry should load");

        let refocus = Arc::new(refocus);
        let transport = Arc::clone(&refocus);
        let shutdown = ShutdownSignal::new();
        let connectors = Arc::new(AppConnectors::with_transport_factory(
            registry,
            Arc::new(move |_: &pyplyn_core::connector::Connector| {
                Ok(Arc::clone(&transport) as Arc<dyn HttpTransport>)
            }),
            shutdown.clone(),
        ));
        let status = Arc::new(SystemStatus::new());

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

        let scheduler = Arc::new(TaskScheduler::new(engine, shutdown.clone()));

        Self {
            _connectors_file: file,
            refocus,
            connectors,
            status,
            shutdown,
            scheduler,
        }
    }
}
