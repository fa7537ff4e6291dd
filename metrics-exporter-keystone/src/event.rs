use std::{collections::BTreeMap, time::UNIX_EPOCH};

use metrics_record::{Metric, MetricRecord};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::{EnvironmentDescriptor, Error};

const PAYLOAD_VERSION: &str = "v1";
const MISSING_LABEL_VALUE: &str = "MISSING";

/// A single Keystone event, carrying one point of one time series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// Unique identifier of the event.
    pub uuid: String,

    /// Event payload.
    pub payload: Payload,
}

/// The payload of an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Payload {
    /// Instance ID of the publishing host.
    pub ec2_instance_id: String,

    /// Stack of the publishing host.
    pub stack: String,

    /// Payload format version.
    pub version: &'static str,

    /// Metric name.
    pub name: String,

    /// Metric kind, such as `GAUGE_DOUBLE`.
    #[serde(rename = "type")]
    pub kind: &'static str,

    /// Labels of the series. Labels without a value are reported as `MISSING`.
    pub metadata: BTreeMap<String, String>,

    /// The point.
    pub point: EventPoint,
}

/// A timestamped value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EventPoint {
    /// Whole seconds since the Unix epoch.
    pub seconds: i64,

    /// Nanoseconds past `seconds`.
    pub nanos: i32,

    /// The value.
    pub value: f64,
}

impl Event {
    /// Builds the event for a single series.
    ///
    /// # Errors
    ///
    /// If the series does not hold exactly one floating-point point, its labels do not line up with the descriptor,
    /// or its point predates the Unix epoch, an error is returned.
    pub fn from_record(environment: &EnvironmentDescriptor, record: &MetricRecord<'_>) -> Result<Self, Error> {
        let metadata = record.tags_with_missing(MISSING_LABEL_VALUE)?;

        let point = record.single_point().ok_or_else(|| Error::UnexpectedPointCount {
            metric: record.name().to_string(),
            count: record.points().len(),
        })?;
        let value = point.as_double().ok_or_else(|| Error::UnexpectedValue {
            metric: record.name().to_string(),
            kind: record.kind(),
            found: point.value.variant_name(),
        })?;
        let since_epoch = point
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::InvalidTimestamp { metric: record.name().to_string() })?;
        let seconds = i64::try_from(since_epoch.as_secs())
            .map_err(|_| Error::InvalidTimestamp { metric: record.name().to_string() })?;

        Ok(Self {
            uuid: Uuid::new_v4().to_string(),
            payload: Payload {
                ec2_instance_id: environment.instance_id().to_string(),
                stack: environment.stack().to_string(),
                version: PAYLOAD_VERSION,
                name: record.name().to_string(),
                kind: record.kind().as_str(),
                metadata,
                point: EventPoint { seconds, nanos: since_epoch.subsec_nanos() as i32, value },
            },
        })
    }
}

/// Builds one event per series of `metric`.
///
/// Series that cannot be turned into an event are logged and skipped.
pub fn events_for_metric(environment: &EnvironmentDescriptor, metric: &Metric) -> Vec<Event> {
    metric
        .records()
        .filter_map(|record| match Event::from_record(environment, &record) {
            Ok(event) => Some(event),
            Err(e) => {
                error!(metric_name = record.name(), error = %e, "Failed to build event for series.");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use metrics_record::{Metric, MetricDescriptor, MetricKind, MetricRecord, Point, PointValue, TimeSeries};
    use serde_json::json;

    use super::{events_for_metric, Event};
    use crate::{EnvironmentDescriptor, Error};

    fn environment() -> EnvironmentDescriptor {
        EnvironmentDescriptor::new("host-1", "main", "i-0abc")
    }

    fn point(value: PointValue) -> Point {
        Point::new(UNIX_EPOCH + Duration::new(1_600_000_000, 250), value)
    }

    #[test]
    fn event_shape() {
        let descriptor =
            MetricDescriptor::new("cpu.utilization", MetricKind::GaugeDouble).with_label_keys(["pod", "node"]);
        let series =
            TimeSeries::new().with_label_values([Some("abc"), None]).with_point(point(PointValue::Double(42.5)));

        let event = Event::from_record(&environment(), &MetricRecord::new(&descriptor, &series)).unwrap();
        assert!(uuid::Uuid::parse_str(&event.uuid).is_ok());

        let actual = serde_json::to_value(&event.payload).unwrap();
        let expected = json!({
            "ec2_instance_id": "i-0abc",
            "stack": "main",
            "version": "v1",
            "name": "cpu.utilization",
            "type": "GAUGE_DOUBLE",
            "metadata": { "node": "MISSING", "pod": "abc" },
            "point": { "seconds": 1_600_000_000, "nanos": 250, "value": 42.5 },
        });
        assert_eq!(actual, expected);
    }

    #[test]
    fn invalid_series_are_skipped() {
        let descriptor = MetricDescriptor::new("requests", MetricKind::CumulativeDouble).with_label_keys(["pod"]);
        let metric = Metric::new(descriptor.clone())
            .with_series(TimeSeries::new().with_label_values([Some("a")]).with_point(point(PointValue::Double(1.0))))
            .with_series(TimeSeries::new().with_label_values([Some("b")]))
            .with_series(
                TimeSeries::new().with_label_values::<_, &str>([]).with_point(point(PointValue::Double(3.0))),
            )
            .with_series(TimeSeries::new().with_label_values([Some("d")]).with_point(point(PointValue::Int64(4))));

        let events = events_for_metric(&environment(), &metric);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload.metadata.get("pod").map(String::as_str), Some("a"));

        let record = MetricRecord::new(&descriptor, &metric.timeseries[1]);
        assert!(matches!(
            Event::from_record(&environment(), &record),
            Err(Error::UnexpectedPointCount { count: 0, .. })
        ));
    }

    #[test]
    fn events_are_unique() {
        let descriptor = MetricDescriptor::new("requests", MetricKind::CumulativeDouble);
        let series = TimeSeries::new().with_point(point(PointValue::Double(1.0)));
        let metric = Metric::new(descriptor).with_series(series.clone()).with_series(series);

        let events = events_for_metric(&environment(), &metric);
        assert_eq!(events.len(), 2);
        assert_ne!(events[0].uuid, events[1].uuid);
    }
}
