use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use metrics_exporter_spectatord::{AdapterCache, Connection, Error, TenantConnector};
use metrics_record::{MetricDescriptor, MetricKind, MetricRecord, Point, PointValue, TimeSeries};

/// Connects every tenant to the same loopback receiver, optionally holding all callers until `barrier` is reached.
struct LoopbackConnector {
    target: SocketAddr,
    barrier: Option<Barrier>,
    connects: AtomicUsize,
}

impl LoopbackConnector {
    fn new(target: SocketAddr) -> Self {
        Self { target, barrier: None, connects: AtomicUsize::new(0) }
    }

    fn with_barrier(target: SocketAddr, callers: usize) -> Self {
        Self { target, barrier: Some(Barrier::new(callers)), connects: AtomicUsize::new(0) }
    }
}

impl TenantConnector for LoopbackConnector {
    fn connect(&self, _tenant: &str) -> Result<Connection, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }

        let socket = UdpSocket::bind("127.0.0.1:0").map_err(|source| Error::Write { source })?;
        socket.connect(self.target).map_err(|source| Error::Write { source })?;
        Ok(socket.into())
    }
}

fn receiver() -> UdpSocket {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    receiver
}

fn received(receiver: &UdpSocket) -> Vec<String> {
    let mut datagrams = Vec::new();
    let mut buf = [0u8; 1024];
    while let Ok(n) = receiver.recv(&mut buf) {
        datagrams.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
    datagrams
}

#[test]
fn concurrent_misses_leave_one_adapter() {
    const CALLERS: usize = 8;

    let rx = receiver();
    let connector = Arc::new(LoopbackConnector::with_barrier(rx.local_addr().unwrap(), CALLERS));
    let cache = Arc::new(AdapterCache::new(Arc::clone(&connector), Duration::from_secs(60)));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_adapter("pod-1").unwrap())
        })
        .collect();
    let adapters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every caller missed and dialed, but only one adapter survived.
    assert_eq!(connector.connects.load(Ordering::SeqCst), CALLERS);
    assert_eq!(cache.len(), 1);
    assert!(adapters.iter().all(|adapter| Arc::ptr_eq(adapter, &adapters[0])));
    assert!(!adapters[0].is_closed());
}

#[test]
fn eviction_forces_redial() {
    let rx = receiver();
    let connector = Arc::new(LoopbackConnector::new(rx.local_addr().unwrap()));
    let cache = AdapterCache::new(Arc::clone(&connector), Duration::from_secs(60));

    cache.get_adapter("pod-1").unwrap();
    cache.get_adapter("pod-2").unwrap();
    cache.get_adapter("pod-1").unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

    assert_eq!(cache.evict_all(), 2);
    cache.get_adapter("pod-1").unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
}

#[test]
fn stale_adapter_fails_after_shutdown() {
    let rx = receiver();
    let connector = Arc::new(LoopbackConnector::new(rx.local_addr().unwrap()));
    let mut cache = AdapterCache::new(connector, Duration::from_secs(60));
    cache.start().unwrap();

    let descriptor = MetricDescriptor::new("cpu", MetricKind::GaugeDouble).with_label_keys(["pod"]);
    let series = TimeSeries::new().with_label_values([Some("pod-1")]).with_point(Point::now(PointValue::Double(0.5)));
    let record = MetricRecord::new(&descriptor, &series);

    let adapter = cache.get_adapter("pod-1").unwrap();
    adapter.update(&record).unwrap();

    cache.shutdown().unwrap();
    assert!(adapter.is_closed());
    assert!(matches!(adapter.update(&record), Err(Error::ConnectionClosed)));

    assert_eq!(received(&rx), vec!["g:cpu,pod=pod-1:0.5"]);
}
