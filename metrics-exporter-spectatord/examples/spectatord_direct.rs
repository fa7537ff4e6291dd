use std::{thread, time::Duration};

use metrics_exporter_spectatord::SpectatordBuilder;
use metrics_record::{
    DistributionValue, Metric, MetricDescriptor, MetricKind, Point, PointValue, SummaryValue, TimeSeries,
};

fn main() {
    tracing_subscriber::fmt::init();

    let exporter = SpectatordBuilder::default()
        .with_remote_address("localhost:1234")
        .expect("failed to parse remote address")
        .build_direct()
        .expect("failed to connect to spectatord");

    let labels = [Some("example-host")];

    // Loop over and over, pretending to do some work.
    loop {
        let latency = rand::random_range(0.0..1.0);

        let batch = [
            Metric::new(MetricDescriptor::new("example.loops", MetricKind::CumulativeDouble).with_label_keys(["host"]))
                .with_series(TimeSeries::new().with_label_values(labels).with_point(Point::now(PointValue::Double(1.0)))),
            Metric::new(MetricDescriptor::new("example.latency", MetricKind::Summary).with_label_keys(["host"]))
                .with_series(TimeSeries::new().with_label_values(labels).with_point(Point::now(PointValue::Summary(
                    SummaryValue::from_percentiles([(50.0, latency / 2.0), (99.0, latency)]),
                )))),
            Metric::new(MetricDescriptor::new("example.duration", MetricKind::CumulativeDistribution).with_label_keys(["host"]))
                .with_series(TimeSeries::new().with_label_values(labels).with_point(Point::now(PointValue::Distribution(
                    DistributionValue::explicit([0.25, 0.5, 1.0], [2, 1, 1, 0], latency * 4.0),
                )))),
        ];

        if let Err(e) = exporter.consume_metrics(&batch) {
            tracing::warn!(error = %e, "Failed to export batch.");
        }

        thread::sleep(Duration::from_millis(500));
    }
}
