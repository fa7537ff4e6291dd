use std::time::Duration;

use metrics_exporter_keystone::{EnvironmentDescriptor, KeystoneBuilder};
use metrics_record::{Metric, MetricDescriptor, MetricKind, Point, PointValue, TimeSeries};

fn main() {
    tracing_subscriber::fmt::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    let exporter = KeystoneBuilder::default()
        .with_gateway_url("http://localhost:7101/REST/v1/stream/titus_container_system_metrics")
        .expect("failed to parse gateway URL")
        .with_environment(EnvironmentDescriptor::new("example-host", "example", "i-0123456789abcdef0"))
        .build()
        .expect("failed to build exporter");

    let mut loops = 0.0;
    runtime.block_on(async {
        loop {
            loops += 1.0;

            let batch = [
                Metric::new(MetricDescriptor::new("example.loops", MetricKind::CumulativeDouble).with_label_keys(["pod"]))
                    .with_series(
                        TimeSeries::new().with_label_values([Some("pod-a")]).with_point(Point::now(PointValue::Double(loops))),
                    ),
                Metric::new(MetricDescriptor::new("example.load", MetricKind::GaugeDouble).with_label_keys(["pod"]))
                    .with_series(
                        TimeSeries::new().with_label_values([Some("pod-a")]).with_point(Point::now(PointValue::Double(0.42))),
                    )
                    .with_series(TimeSeries::new().with_label_values::<_, &str>([None]).with_point(Point::now(PointValue::Double(0.17)))),
            ];

            if let Err(e) = exporter.consume_metrics(&batch).await {
                tracing::warn!(error = %e, "Failed to export batch.");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
}
