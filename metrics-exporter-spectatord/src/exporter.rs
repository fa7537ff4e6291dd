use std::sync::Arc;

use metrics_record::{Metric, MetricRecord};
use tracing::{debug, trace};

use crate::{adapter::Adapter, cache::AdapterCache, error::ErrorList, Error};

pub(crate) enum Routing {
    /// Each series goes to the spectatord of the tenant named by its tenant label.
    PerTenant { cache: AdapterCache, tenant_label: String },

    /// Every series goes to a single spectatord.
    Direct { adapter: Arc<Adapter>, address: String },
}

/// Exports batches of metrics to spectatord.
///
/// Built with [`SpectatordBuilder`][crate::SpectatordBuilder].
pub struct SpectatordExporter {
    routing: Routing,
}

impl SpectatordExporter {
    pub(crate) fn new(routing: Routing) -> Self {
        Self { routing }
    }

    /// Starts the exporter.
    ///
    /// When exporting per tenant, this starts periodic eviction of cached connections.
    ///
    /// # Errors
    ///
    /// If the background eviction thread cannot be spawned, an error is returned.
    pub fn start(&mut self) -> Result<(), Error> {
        match &mut self.routing {
            Routing::PerTenant { cache, .. } => cache.start(),
            Routing::Direct { .. } => Ok(()),
        }
    }

    /// Exports a batch of metrics.
    ///
    /// Every series of every metric is attempted, regardless of failures exporting the others.
    ///
    /// # Errors
    ///
    /// All failures for the batch are returned together.
    pub fn consume_metrics(&self, metrics: &[Metric]) -> Result<(), Error> {
        let mut errors = ErrorList::default();
        for metric in metrics {
            for record in metric.records() {
                errors.record(self.export_record(&record));
            }
        }

        errors.into_result()
    }

    fn export_record(&self, record: &MetricRecord<'_>) -> Result<(), Error> {
        match &self.routing {
            Routing::PerTenant { cache, tenant_label } => {
                let tenant = record.label_value(tenant_label).ok_or_else(|| Error::MissingTenant {
                    label: tenant_label.clone(),
                    metric: record.name().to_string(),
                })?;

                trace!(tenant, metric_name = record.name(), "Exporting series.");
                cache.get_adapter(tenant)?.update(record)
            }
            Routing::Direct { adapter, .. } => {
                trace!(metric_name = record.name(), "Exporting series.");
                adapter.update(record)
            }
        }
    }

    /// Returns the adapter cache, if exporting per tenant.
    pub fn cache(&self) -> Option<&AdapterCache> {
        match &self.routing {
            Routing::PerTenant { cache, .. } => Some(cache),
            Routing::Direct { .. } => None,
        }
    }

    /// Shuts the exporter down, closing every connection.
    ///
    /// # Errors
    ///
    /// If any connection fails to close, the failures are returned together.
    pub fn shutdown(self) -> Result<(), Error> {
        match self.routing {
            Routing::PerTenant { cache, .. } => cache.shutdown(),
            Routing::Direct { adapter, address } => {
                debug!(address, "Shutting down spectatord exporter.");
                match adapter.close() {
                    Ok(_) => Ok(()),
                    Err(source) => Err(Error::Close { tenant: address, source }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::UdpSocket, sync::Arc, time::Duration};

    use metrics_record::{Metric, MetricDescriptor, MetricKind, Point, PointValue, TimeSeries};
    use mockall::predicate::eq;

    use super::{Routing, SpectatordExporter};
    use crate::{
        adapter::Adapter, cache::AdapterCache, connector::MockTenantConnector, dialer::Connection,
        telemetry::Telemetry, Error,
    };

    fn receiver() -> UdpSocket {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        receiver
    }

    fn connection_to(receiver: &UdpSocket) -> Connection {
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.connect(receiver.local_addr().unwrap()).unwrap();
        sender.into()
    }

    fn received(receiver: &UdpSocket) -> Vec<String> {
        let mut datagrams = Vec::new();
        let mut buf = [0u8; 1024];
        while let Ok(n) = receiver.recv(&mut buf) {
            datagrams.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        }
        datagrams
    }

    fn gauge(name: &str, pods: &[Option<&str>]) -> Metric {
        let descriptor = MetricDescriptor::new(name, MetricKind::GaugeDouble).with_label_keys(["pod"]);
        pods.iter().fold(Metric::new(descriptor), |metric, pod| {
            metric.with_series(
                TimeSeries::new().with_label_values([*pod]).with_point(Point::now(PointValue::Double(1.0))),
            )
        })
    }

    #[test]
    fn routes_by_tenant_label() {
        let rx = receiver();
        let addr = rx.local_addr().unwrap();

        let mut connector = MockTenantConnector::new();
        connector.expect_connect().with(eq("abc")).times(1).returning(move |_| {
            let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
            sender.connect(addr).unwrap();
            Ok(sender.into())
        });

        let cache = AdapterCache::new(connector, Duration::from_secs(60));
        let exporter =
            SpectatordExporter::new(Routing::PerTenant { cache, tenant_label: "pod".to_string() });

        exporter.consume_metrics(&[gauge("cpu", &[Some("abc")]), gauge("mem", &[Some("abc")])]).unwrap();
        assert_eq!(received(&rx), vec!["g:cpu,pod=abc:1.0", "g:mem,pod=abc:1.0"]);
        assert_eq!(exporter.cache().map(AdapterCache::len), Some(1));

        exporter.shutdown().unwrap();
    }

    #[test]
    fn errors_do_not_stop_the_batch() {
        let rx = receiver();
        let addr = rx.local_addr().unwrap();

        let mut connector = MockTenantConnector::new();
        connector
            .expect_connect()
            .with(eq("gone"))
            .returning(|_| Err(Error::UnknownIsolationDomain { path: "/envs/gone/netns".into() }));
        connector.expect_connect().with(eq("abc")).returning(move |_| {
            let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
            sender.connect(addr).unwrap();
            Ok(sender.into())
        });

        let cache = AdapterCache::new(connector, Duration::from_secs(60));
        let exporter =
            SpectatordExporter::new(Routing::PerTenant { cache, tenant_label: "pod".to_string() });

        let batch = [gauge("cpu", &[Some("gone"), None, Some("abc")])];
        let err = exporter.consume_metrics(&batch).unwrap_err();

        let errors = err.errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], Error::UnknownIsolationDomain { .. }));
        assert!(matches!(&errors[1], Error::MissingTenant { label, .. } if label == "pod"));
        assert_eq!(received(&rx), vec!["g:cpu,pod=abc:1.0"]);
    }

    #[test]
    fn direct_routing_ignores_tenant_label() {
        let rx = receiver();
        let adapter = Arc::new(Adapter::new(connection_to(&rx), Telemetry::new("test")));
        let exporter = SpectatordExporter::new(Routing::Direct {
            adapter: Arc::clone(&adapter),
            address: rx.local_addr().unwrap().to_string(),
        });
        assert!(exporter.cache().is_none());

        exporter.consume_metrics(&[gauge("cpu", &[None])]).unwrap();
        assert_eq!(received(&rx), vec!["g:cpu:1.0"]);

        exporter.shutdown().unwrap();
        assert!(adapter.is_closed());
    }
}
