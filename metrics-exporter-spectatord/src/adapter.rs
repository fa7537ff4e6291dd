use std::fmt;

use metrics_record::{DistributionValue, MetricKind, MetricRecord, PointValue, SummaryValue};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::{
    dialer::Connection,
    error::ErrorList,
    protocol::{format_float, DatagramWriter, MetricType, MetricValue},
    telemetry::Telemetry,
    Error,
};

const PERCENTILE_TAG: &str = "percentile";
const BUCKET_TAG: &str = "bucket";
const STATISTIC_TAG: &str = "statistic";
const TOTAL_TIME: &str = "totalTime";
const OVERFLOW_BUCKET: &str = "Inf";

/// Writes metric records to a single spectatord connection.
///
/// Adapters are handed out as `Arc<Adapter>` and may be updated from many threads at once. Only the owner that
/// created the adapter can close it; updating a closed adapter fails with [`Error::ConnectionClosed`].
pub struct Adapter {
    connection: RwLock<Option<Connection>>,
    telemetry: Telemetry,
}

impl Adapter {
    pub(crate) fn new(connection: Connection, telemetry: Telemetry) -> Self {
        Self { connection: RwLock::new(Some(connection)), telemetry }
    }

    /// Writes a single series to spectatord.
    ///
    /// Counters and gauges produce one datagram. Summaries produce one gauge per percentile, in ascending percentile
    /// order. Cumulative distributions produce one counter per bucket followed by a counter holding the sum. Metrics
    /// of any other kind are skipped.
    ///
    /// # Errors
    ///
    /// If the record does not have the shape its kind requires, an error is returned and nothing is written. Write
    /// failures for summaries and distributions do not stop the remaining datagrams from being written, and are
    /// returned together.
    pub fn update(&self, record: &MetricRecord<'_>) -> Result<(), Error> {
        match record.kind() {
            MetricKind::CumulativeDouble => self.update_scalar(record, MetricType::Counter),
            MetricKind::GaugeDouble => self.update_scalar(record, MetricType::Gauge),
            MetricKind::Summary => self.update_summary(record),
            MetricKind::CumulativeDistribution => self.update_distribution(record),
            kind => {
                debug!(metric_name = record.name(), %kind, "Skipping metric of unsupported kind.");
                Ok(())
            }
        }
    }

    fn update_scalar(&self, record: &MetricRecord<'_>, metric_type: MetricType) -> Result<(), Error> {
        let point = single_point(record)?;
        let value = point.as_double().ok_or_else(|| unexpected_value(record, &point.value))?;
        let tags = record.tags()?;

        let mut writer = DatagramWriter::new();
        self.send(writer.write(metric_type, record.name(), &tags, MetricValue::FloatingPoint(value)))
    }

    fn update_summary(&self, record: &MetricRecord<'_>) -> Result<(), Error> {
        let point = single_point(record)?;
        let snapshot = match &point.value {
            PointValue::Summary(SummaryValue { snapshot: Some(snapshot), .. }) => snapshot,
            PointValue::Summary(_) => return Err(Error::MissingSnapshot { metric: record.name().to_string() }),
            other => return Err(unexpected_value(record, other)),
        };
        let mut tags = record.tags()?;

        let mut percentiles = snapshot.percentile_values.clone();
        percentiles.sort_by(|a, b| a.percentile.total_cmp(&b.percentile));

        let mut writer = DatagramWriter::new();
        let mut errors = ErrorList::default();
        for pv in percentiles {
            tags.insert(PERCENTILE_TAG.to_string(), format_float(pv.percentile));
            let datagram = writer.write(MetricType::Gauge, record.name(), &tags, MetricValue::FloatingPoint(pv.value));
            errors.record(self.send(datagram));
        }

        errors.into_result()
    }

    fn update_distribution(&self, record: &MetricRecord<'_>) -> Result<(), Error> {
        let Some((distribution, bounds)) = explicit_distribution(record) else {
            warn!(metric_name = record.name(), "Dropping distribution without a single point and explicit buckets.");
            self.telemetry.track_record_dropped();
            return Ok(());
        };
        let mut tags = record.tags()?;

        let mut writer = DatagramWriter::new();
        let mut errors = ErrorList::default();
        for (i, bucket) in distribution.buckets.iter().enumerate() {
            let bound = bounds.get(i).map_or_else(|| OVERFLOW_BUCKET.to_string(), |b| format_float(*b));
            tags.insert(BUCKET_TAG.to_string(), bound);

            let datagram = writer.write(MetricType::Counter, record.name(), &tags, MetricValue::Integer(bucket.count));
            errors.record(self.send(datagram));
        }

        tags.remove(BUCKET_TAG);
        tags.insert(STATISTIC_TAG.to_string(), TOTAL_TIME.to_string());
        let datagram =
            writer.write(MetricType::Counter, record.name(), &tags, MetricValue::FloatingPoint(distribution.sum));
        errors.record(self.send(datagram));

        errors.into_result()
    }

    fn send(&self, datagram: &str) -> Result<(), Error> {
        let connection = self.connection.read();
        let Some(connection) = connection.as_ref() else {
            self.telemetry.track_datagram_failed();
            return Err(Error::ConnectionClosed);
        };

        match connection.send(datagram.as_bytes()) {
            Ok(_) => {
                trace!(datagram, "Wrote datagram.");
                self.telemetry.track_datagram_sent(datagram.len());
                Ok(())
            }
            Err(source) => {
                self.telemetry.track_datagram_failed();
                Err(Error::Write { source })
            }
        }
    }

    /// Closes the connection.
    ///
    /// Returns `Ok(true)` if this call closed the connection, or `Ok(false)` if it was already closed.
    pub(crate) fn close(&self) -> std::io::Result<bool> {
        let connection = self.connection.write().take();
        match connection {
            Some(connection) => connection.close().map(|()| true),
            None => Ok(false),
        }
    }

    /// Returns `true` if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.connection.read().is_none()
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter").field("connection", &*self.connection.read()).finish_non_exhaustive()
    }
}

fn single_point<'a>(record: &MetricRecord<'a>) -> Result<&'a metrics_record::Point, Error> {
    record.single_point().ok_or_else(|| Error::UnexpectedPointCount {
        metric: record.name().to_string(),
        count: record.points().len(),
    })
}

fn unexpected_value(record: &MetricRecord<'_>, value: &PointValue) -> Error {
    Error::UnexpectedValue { metric: record.name().to_string(), kind: record.kind(), found: value.variant_name() }
}

fn explicit_distribution<'a>(record: &MetricRecord<'a>) -> Option<(&'a DistributionValue, &'a [f64])> {
    let PointValue::Distribution(distribution) = &record.single_point()?.value else {
        return None;
    };
    let bounds = distribution.explicit_bounds().filter(|bounds| !bounds.is_empty())?;
    if distribution.buckets.len() != bounds.len() + 1 {
        return None;
    }

    Some((distribution, bounds))
}

#[cfg(test)]
mod tests {
    use std::{net::UdpSocket, time::Duration};

    use metrics_record::{
        DistributionValue, MetricDescriptor, MetricKind, MetricRecord, Point, PointValue, SummaryValue, TimeSeries,
    };

    use super::Adapter;
    use crate::{telemetry::Telemetry, Error};

    struct Harness {
        receiver: UdpSocket,
        adapter: Adapter,
    }

    impl Harness {
        fn new() -> Self {
            let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
            receiver.set_read_timeout(Some(Duration::from_millis(200))).unwrap();

            let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
            sender.connect(receiver.local_addr().unwrap()).unwrap();

            let adapter = Adapter::new(sender.into(), Telemetry::new("test"));
            Self { receiver, adapter }
        }

        fn received(&self) -> Vec<String> {
            let mut datagrams = Vec::new();
            let mut buf = [0u8; 1024];
            while let Ok(n) = self.receiver.recv(&mut buf) {
                datagrams.push(String::from_utf8_lossy(&buf[..n]).into_owned());
            }
            datagrams
        }
    }

    fn descriptor(name: &str, kind: MetricKind) -> MetricDescriptor {
        MetricDescriptor::new(name, kind).with_label_keys(["pod"])
    }

    fn series(values: &[PointValue]) -> TimeSeries {
        values.iter().fold(TimeSeries::new().with_label_values([Some("abc")]), |series, value| {
            series.with_point(Point::now(value.clone()))
        })
    }

    #[test]
    fn gauge_and_counter() {
        let harness = Harness::new();

        let gauge = descriptor("cpu.utilization", MetricKind::GaugeDouble);
        let counter = descriptor("requests", MetricKind::CumulativeDouble);
        let s = series(&[PointValue::Double(42.5)]);

        harness.adapter.update(&MetricRecord::new(&gauge, &s)).unwrap();
        harness.adapter.update(&MetricRecord::new(&counter, &s)).unwrap();

        assert_eq!(harness.received(), vec!["g:cpu.utilization,pod=abc:42.5", "C:requests,pod=abc:42.5"]);
    }

    #[test]
    fn scalar_requires_exactly_one_point() {
        let harness = Harness::new();
        let d = descriptor("cpu", MetricKind::GaugeDouble);

        for values in [vec![], vec![PointValue::Double(1.0), PointValue::Double(2.0)]] {
            let s = series(&values);
            let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
            assert!(matches!(err, Error::UnexpectedPointCount { count, .. } if count == values.len()));
        }

        assert!(harness.received().is_empty());
    }

    #[test]
    fn scalar_rejects_wrong_value() {
        let harness = Harness::new();
        let d = descriptor("cpu", MetricKind::GaugeDouble);
        let s = series(&[PointValue::Int64(3)]);

        let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedValue { found: "int64", .. }));
        assert!(harness.received().is_empty());
    }

    #[test]
    fn summary_in_ascending_percentile_order() {
        let harness = Harness::new();
        let d = descriptor("latency", MetricKind::Summary);
        let s = series(&[PointValue::Summary(SummaryValue::from_percentiles([(99.0, 12.5), (50.0, 3.0), (90.0, 8.0)]))]);

        harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap();

        assert_eq!(
            harness.received(),
            vec![
                "g:latency,percentile=50.0,pod=abc:3.0",
                "g:latency,percentile=90.0,pod=abc:8.0",
                "g:latency,percentile=99.0,pod=abc:12.5",
            ]
        );
    }

    #[test]
    fn summary_without_snapshot() {
        let harness = Harness::new();
        let d = descriptor("latency", MetricKind::Summary);
        let s = series(&[PointValue::Summary(SummaryValue::default())]);

        let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
        assert!(matches!(err, Error::MissingSnapshot { .. }));
    }

    #[test]
    fn distribution() {
        let harness = Harness::new();
        let d = descriptor("req.time", MetricKind::CumulativeDistribution);
        let s = series(&[PointValue::Distribution(DistributionValue::explicit([0.5, 1.0], [3, 4, 1], 4.25))]);

        harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap();

        assert_eq!(
            harness.received(),
            vec![
                "C:req.time,bucket=0.5,pod=abc:3",
                "C:req.time,bucket=1.0,pod=abc:4",
                "C:req.time,bucket=Inf,pod=abc:1",
                "C:req.time,pod=abc,statistic=totalTime:4.25",
            ]
        );
    }

    #[test]
    fn malformed_distributions_are_dropped() {
        let harness = Harness::new();
        let d = descriptor("req.time", MetricKind::CumulativeDistribution);

        let no_bounds = DistributionValue { count: 1, sum: 1.0, bucket_options: None, buckets: vec![] };
        let empty_bounds = DistributionValue::explicit(Vec::new(), [1], 1.0);
        let short_counts = DistributionValue::explicit([0.5, 1.0], [1, 2], 1.0);
        let cases = [
            series(&[PointValue::Distribution(no_bounds)]),
            series(&[PointValue::Distribution(empty_bounds)]),
            series(&[PointValue::Distribution(short_counts)]),
            series(&[PointValue::Double(1.0)]),
            series(&[]),
        ];

        for s in &cases {
            harness.adapter.update(&MetricRecord::new(&d, s)).unwrap();
        }
        assert!(harness.received().is_empty());
    }

    #[test]
    fn other_kinds_are_skipped() {
        let harness = Harness::new();
        let d = descriptor("threads", MetricKind::GaugeInt64);
        let s = series(&[PointValue::Int64(12)]);

        harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap();
        assert!(harness.received().is_empty());
    }

    #[test]
    fn label_mismatch() {
        let harness = Harness::new();
        let d = MetricDescriptor::new("cpu", MetricKind::GaugeDouble).with_label_keys(["pod", "zone"]);
        let s = series(&[PointValue::Double(1.0)]);

        let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
        assert!(matches!(err, Error::Labels(_)));
    }

    #[test]
    fn closed_adapter_rejects_writes() {
        let harness = Harness::new();
        assert!(harness.adapter.close().unwrap());
        assert!(!harness.adapter.close().unwrap());
        assert!(harness.adapter.is_closed());

        let d = descriptor("cpu", MetricKind::GaugeDouble);
        let s = series(&[PointValue::Double(1.0)]);
        let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        // Every datagram of a multi-datagram record fails on its own.
        let d = descriptor("latency", MetricKind::Summary);
        let s = series(&[PointValue::Summary(SummaryValue::from_percentiles([(50.0, 1.0), (99.0, 2.0)]))]);
        let err = harness.adapter.update(&MetricRecord::new(&d, &s)).unwrap_err();
        assert_eq!(err.errors().len(), 2);
    }
}
