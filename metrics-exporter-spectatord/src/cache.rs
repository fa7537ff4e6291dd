use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{select, tick, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::{adapter::Adapter, connector::TenantConnector, error::ErrorList, telemetry::Telemetry, Error};

struct Inner {
    adapters: RwLock<HashMap<String, Arc<Adapter>>>,
    connector: Box<dyn TenantConnector>,
    telemetry: Telemetry,
}

impl Inner {
    fn evict_all(&self) -> usize {
        // Close outside of the lock so that writers are not held up by slow closes.
        let evicted: Vec<_> = self.adapters.write().drain().collect();
        let count = evicted.len();

        for (tenant, adapter) in evicted {
            if let Err(e) = adapter.close() {
                warn!(tenant = %tenant, error = %e, "Failed to close evicted adapter.");
            }
        }

        self.telemetry.track_adapters_evicted(count);
        count
    }
}

struct Evictor {
    // Dropping the sender is the shutdown signal.
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Evictor {
    fn spawn(inner: Arc<Inner>, interval: Duration) -> Result<Self, Error> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        let handle = thread::Builder::new()
            .name("metrics-exporter-spectatord-evictor".to_string())
            .spawn(move || run_evictor(&inner, interval, &shutdown_rx))
            .map_err(|source| Error::Spawn { source })?;

        Ok(Self { shutdown_tx, handle })
    }

    fn stop(self) {
        drop(self.shutdown_tx);
        if self.handle.join().is_err() {
            error!("Adapter eviction thread panicked.");
        }
    }
}

fn run_evictor(inner: &Inner, interval: Duration, shutdown_rx: &Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                let evicted = inner.evict_all();
                debug!(evicted, "Evicted all spectatord adapters.");
            }
            recv(shutdown_rx) -> _ => break,
        }
    }
}

/// A cache of spectatord adapters, keyed by tenant.
///
/// Adapters are created on first use by dialing through a [`TenantConnector`], and shared by every caller asking for
/// the same tenant. Once [started][AdapterCache::start], the whole cache is cleared on a fixed interval so that
/// connections to tenants that have gone away do not accumulate. Callers holding an adapter across a clear will see
/// [`Error::ConnectionClosed`] on their next write, and should ask the cache again.
///
/// Failed connection attempts are never cached: the next request for the same tenant dials again.
pub struct AdapterCache {
    inner: Arc<Inner>,
    eviction_interval: Duration,
    evictor: Option<Evictor>,
}

impl AdapterCache {
    /// Creates a new `AdapterCache` that connects through `connector` and, once started, clears itself every
    /// `eviction_interval`.
    ///
    /// The cache registers its telemetry counters with the global [`metrics`] recorder when created.
    pub fn new<C>(connector: C, eviction_interval: Duration) -> Self
    where
        C: TenantConnector + 'static,
    {
        let inner = Inner {
            adapters: RwLock::new(HashMap::new()),
            connector: Box::new(connector),
            telemetry: Telemetry::new("per_tenant"),
        };
        Self { inner: Arc::new(inner), eviction_interval, evictor: None }
    }

    /// Starts periodic eviction.
    ///
    /// Calling `start` on a cache that is already started has no effect.
    ///
    /// # Errors
    ///
    /// If the background eviction thread cannot be spawned, an error is returned.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.evictor.is_some() {
            debug!("Adapter cache already started.");
            return Ok(());
        }

        self.evictor = Some(Evictor::spawn(Arc::clone(&self.inner), self.eviction_interval)?);
        Ok(())
    }

    /// Gets the adapter for `tenant`, connecting to the tenant's spectatord if there is none yet.
    ///
    /// # Errors
    ///
    /// If no adapter is cached for the tenant and a connection cannot be established, an error is returned.
    pub fn get_adapter(&self, tenant: &str) -> Result<Arc<Adapter>, Error> {
        {
            let adapters = self.inner.adapters.read();
            if let Some(adapter) = adapters.get(tenant) {
                return Ok(Arc::clone(adapter));
            }
        }

        // Dial without holding the lock: connecting may block for as long as the dial timeout.
        let connection = self.inner.connector.connect(tenant).map_err(|e| {
            warn!(tenant, error = %e, "Failed to connect to spectatord.");
            self.inner.telemetry.track_connect_failed();
            e
        })?;
        let adapter = Arc::new(Adapter::new(connection, self.inner.telemetry.clone()));

        let mut adapters = self.inner.adapters.write();
        match adapters.entry(tenant.to_string()) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                drop(adapters);

                debug!(tenant, "Another caller connected first, closing redundant adapter.");
                if let Err(e) = adapter.close() {
                    warn!(tenant, error = %e, "Failed to close redundant adapter.");
                }
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&adapter));
                drop(adapters);

                debug!(tenant, "Created spectatord adapter.");
                self.inner.telemetry.track_adapter_created();
                Ok(adapter)
            }
        }
    }

    /// Removes and closes every cached adapter, returning how many were removed.
    pub fn evict_all(&self) -> usize {
        self.inner.evict_all()
    }

    /// Returns the number of cached adapters.
    pub fn len(&self) -> usize {
        self.inner.adapters.read().len()
    }

    /// Returns `true` if no adapters are cached.
    pub fn is_empty(&self) -> bool {
        self.inner.adapters.read().is_empty()
    }

    /// Stops periodic eviction and closes every cached adapter.
    ///
    /// # Errors
    ///
    /// Every adapter is closed even if closing another one fails. All failures are returned together.
    pub fn shutdown(mut self) -> Result<(), Error> {
        if let Some(evictor) = self.evictor.take() {
            evictor.stop();
        }

        let adapters: Vec<_> = self.inner.adapters.write().drain().collect();
        debug!(adapters = adapters.len(), "Shutting down adapter cache.");

        let mut errors = ErrorList::default();
        for (tenant, adapter) in adapters {
            if let Err(source) = adapter.close() {
                errors.push(Error::Close { tenant, source });
            }
        }

        errors.into_result()
    }
}

impl Drop for AdapterCache {
    fn drop(&mut self) {
        if let Some(evictor) = self.evictor.take() {
            evictor.stop();
        }
    }
}

impl fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterCache")
            .field("adapters", &self.len())
            .field("eviction_interval", &self.eviction_interval)
            .field("started", &self.evictor.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{net::UdpSocket, sync::Arc, time::Duration};

    use mockall::{predicate::eq, Sequence};

    use super::AdapterCache;
    use crate::{connector::MockTenantConnector, dialer::Connection, Error};

    fn loopback_connection() -> Connection {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(receiver.local_addr().unwrap()).unwrap();
        sender.into()
    }

    fn cache(connector: MockTenantConnector) -> AdapterCache {
        AdapterCache::new(connector, Duration::from_secs(60))
    }

    #[test]
    fn hit_reuses_adapter() {
        let mut connector = MockTenantConnector::new();
        connector.expect_connect().with(eq("pod-1")).times(1).returning(|_| Ok(loopback_connection()));

        let cache = cache(connector);
        let first = cache.get_adapter("pod-1").unwrap();
        let second = cache.get_adapter("pod-1").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let mut seq = Sequence::new();
        let mut connector = MockTenantConnector::new();
        connector
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(Error::UnknownIsolationDomain { path: "/envs/pod-1/netns".into() }));
        connector.expect_connect().times(1).in_sequence(&mut seq).returning(|_| Ok(loopback_connection()));

        let cache = cache(connector);
        assert!(matches!(cache.get_adapter("pod-1"), Err(Error::UnknownIsolationDomain { .. })));
        assert!(cache.is_empty());

        cache.get_adapter("pod-1").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_closes_and_redials() {
        let mut connector = MockTenantConnector::new();
        connector.expect_connect().times(2).returning(|_| Ok(loopback_connection()));

        let cache = cache(connector);
        let before = cache.get_adapter("pod-1").unwrap();

        assert_eq!(cache.evict_all(), 1);
        assert!(cache.is_empty());
        assert!(before.is_closed());

        let after = cache.get_adapter("pod-1").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(!after.is_closed());
    }

    #[test]
    fn periodic_eviction() {
        let mut connector = MockTenantConnector::new();
        connector.expect_connect().returning(|_| Ok(loopback_connection()));

        let mut cache = AdapterCache::new(connector, Duration::from_millis(20));
        cache.start().unwrap();
        cache.start().unwrap();

        let adapter = cache.get_adapter("pod-1").unwrap();
        for _ in 0..100 {
            if adapter.is_closed() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(adapter.is_closed());

        cache.shutdown().unwrap();
    }

    #[test]
    fn shutdown_closes_everything() {
        let mut connector = MockTenantConnector::new();
        connector.expect_connect().times(2).returning(|_| Ok(loopback_connection()));

        let mut cache = cache(connector);
        cache.start().unwrap();
        let a = cache.get_adapter("pod-1").unwrap();
        let b = cache.get_adapter("pod-2").unwrap();

        cache.shutdown().unwrap();
        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}
