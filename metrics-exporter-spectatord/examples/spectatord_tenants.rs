use std::{env, thread, time::Duration};

use metrics_exporter_spectatord::SpectatordBuilder;
use metrics_record::{Metric, MetricDescriptor, MetricKind, Point, PointValue, TimeSeries};

fn main() {
    tracing_subscriber::fmt::init();

    // Tenants to report for, such as `pod-a pod-b`. Each needs `<root>/<tenant>/netns` to point at a namespace handle.
    let tenants: Vec<String> = env::args().skip(1).collect();
    let root = env::var("NAMESPACE_ROOT").unwrap_or_else(|_| "/var/lib/titus-environments".to_string());

    let mut exporter = SpectatordBuilder::default()
        .with_namespace_root(root)
        .with_eviction_interval(Duration::from_secs(10))
        .build()
        .expect("failed to build exporter");
    exporter.start().expect("failed to start exporter");

    for _ in 0..60 {
        let descriptor = MetricDescriptor::new("example.cpu.utilization", MetricKind::GaugeDouble).with_label_keys(["pod"]);
        let metric = tenants.iter().fold(Metric::new(descriptor), |metric, tenant| {
            let value = rand::random_range(0.0..100.0);
            metric.with_series(
                TimeSeries::new().with_label_values([Some(tenant.as_str())]).with_point(Point::now(PointValue::Double(value))),
            )
        });

        if let Err(e) = exporter.consume_metrics(&[metric]) {
            tracing::warn!(error = %e, "Failed to export batch.");
        }

        thread::sleep(Duration::from_secs(1));
    }

    exporter.shutdown().expect("failed to shut down exporter");
}
