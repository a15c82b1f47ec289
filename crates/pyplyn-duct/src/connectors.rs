//! Memoized per-endpoint client and cache factory.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use pyplyn_core::cache::{run_sweeper, Cache, Cacheable};
use pyplyn_core::client::{HttpTransport, RemoteClient, ReqwestTransport};
use pyplyn_core::connector::{Connector, ConnectorRegistry};
use pyplyn_core::error::ConfigError;
use pyplyn_core::shutdown::ShutdownSignal;

/// Builds a transport for a connector; injectable so tests can substitute
/// scripted transports.
pub type TransportFactory =
    Arc<dyn Fn(&Connector) -> Result<Arc<dyn HttpTransport>, ConfigError> + Send + Sync>;

/// Clients constructible from a connector record plus a transport.
pub trait ClientFactory: RemoteClient + Sized + 'static {
    fn build(connector: Connector, transport: Arc<dyn HttpTransport>) -> Self;
}

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Hands out the client and sample cache for `(endpoint, service type)`
/// tuples, memoized for the lifetime of the process: the same tuple always
/// yields the same pair, and concurrent first accesses never build twice.
///
/// A sweep loop is spawned for every cache on first use, so callers must be
/// inside the runtime.
pub struct AppConnectors {
    registry: ConnectorRegistry,
    transports: TransportFactory,
    clients: DashMap<(String, TypeId), Arc<dyn Any + Send + Sync>>,
    caches: DashMap<(String, TypeId), Arc<dyn Any + Send + Sync>>,
    shutdown: ShutdownSignal,
    sweep_interval: Duration,
}

impl AppConnectors {
    pub fn new(registry: ConnectorRegistry, shutdown: ShutdownSignal) -> Self {
        let transports: TransportFactory = Arc::new(|connector: &Connector| {
            Ok(Arc::new(ReqwestTransport::for_connector(connector)?) as Arc<dyn HttpTransport>)
        });
        Self::with_transport_factory(registry, transports, shutdown)
    }

    pub fn with_transport_factory(
        registry: ConnectorRegistry,
        transports: TransportFactory,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            registry,
            transports,
            clients: DashMap::new(),
            caches: DashMap::new(),
            shutdown,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// The memoized `(client, cache)` pair for `endpoint_id`.
    ///
    /// An unknown endpoint is a configuration error; a type confusion in the
    /// memoization maps is an internal one.
    pub fn client_and_cache<C, S>(
        &self,
        endpoint_id: &str,
    ) -> Result<(Arc<C>, Arc<Cache<S>>), ConfigError>
    where
        C: ClientFactory + Send + Sync,
        S: Cacheable + Clone + Send + Sync + 'static,
    {
        let client_entry = match self.clients.entry((endpoint_id.to_string(), TypeId::of::<C>())) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let connector = self
                    .registry
                    .find(endpoint_id)
                    .ok_or_else(|| ConfigError::MissingConnector(endpoint_id.to_string()))?
                    .clone();
                let transport = (self.transports)(&connector)?;
                let client: Arc<dyn Any + Send + Sync> = Arc::new(C::build(connector, transport));
                entry.insert(Arc::clone(&client));
                client
            }
        };

        let cache_entry = match self.caches.entry((endpoint_id.to_string(), TypeId::of::<S>())) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let cache = Arc::new(Cache::<S>::new());
                tokio::spawn(run_sweeper(
                    Arc::clone(&cache),
                    self.sweep_interval,
                    self.shutdown.clone(),
                ));
                let any: Arc<dyn Any + Send + Sync> = cache;
                entry.insert(Arc::clone(&any));
                any
            }
        };

        let client = client_entry
            .downcast::<C>()
            .map_err(|_| ConfigError::Internal(format!("client type mismatch for '{endpoint_id}'")))?;
        let cache = cache_entry
            .downcast::<Cache<S>>()
            .map_err(|_| ConfigError::Internal(format!("cache type mismatch for '{endpoint_id}'")))?;

        Ok((client, cache))
    }
}
