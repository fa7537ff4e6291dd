use metrics::{counter, Counter};

/// Exporter telemetry.
///
/// `Telemetry` records the exporter's own behavior through the globally installed [`metrics`] recorder. The counters
/// are registered when the exporter is built, so a recorder installed afterwards will not see them.
///
/// All internal telemetry is under the `spectatord.exporter` namespace.
#[derive(Clone)]
pub(crate) struct Telemetry {
    datagrams_sent: Counter,
    datagrams_failed: Counter,
    bytes_sent: Counter,
    records_dropped: Counter,
    adapters_created: Counter,
    adapters_evicted: Counter,
    connect_failures: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new(mode: &'static str) -> Self {
        let labels = telemetry_tags!("mode" => mode);

        Self {
            datagrams_sent: counter!("spectatord.exporter.datagrams_sent", labels.iter()),
            datagrams_failed: counter!("spectatord.exporter.datagrams_failed", labels.iter()),
            bytes_sent: counter!("spectatord.exporter.bytes_sent", labels.iter()),
            records_dropped: counter!("spectatord.exporter.records_dropped", labels.iter()),
            adapters_created: counter!("spectatord.exporter.adapters_created", labels.iter()),
            adapters_evicted: counter!("spectatord.exporter.adapters_evicted", labels.iter()),
            connect_failures: counter!("spectatord.exporter.connect_failures", labels.iter()),
        }
    }

    pub fn track_datagram_sent(&self, bytes_len: usize) {
        self.datagrams_sent.increment(1);
        self.bytes_sent.increment(bytes_len as u64);
    }

    pub fn track_datagram_failed(&self) {
        self.datagrams_failed.increment(1);
    }

    /// Tracks a record that was skipped without raising an error, such as a malformed distribution.
    pub fn track_record_dropped(&self) {
        self.records_dropped.increment(1);
    }

    pub fn track_adapter_created(&self) {
        self.adapters_created.increment(1);
    }

    pub fn track_adapters_evicted(&self, count: usize) {
        self.adapters_evicted.increment(count as u64);
    }

    pub fn track_connect_failed(&self) {
        self.connect_failures.increment(1);
    }
}

macro_rules! _telemetry_tags {
    ($($k:literal => $v:expr),*) => {
        [
            ::metrics::Label::from_static_parts("exporter", "spectatord"),
            ::metrics::Label::from_static_parts("exporter_version", env!("CARGO_PKG_VERSION")),
            $(::metrics::Label::from_static_parts($k, $v),)*
        ]
    };
}

pub(crate) use _telemetry_tags as telemetry_tags;
