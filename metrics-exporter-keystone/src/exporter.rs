use metrics_record::{Metric, MetricKind};
use tracing::{debug, error};

use crate::{event::events_for_metric, publish::MessageSplitter, EnvironmentDescriptor, Error, Publisher};

/// Exports batches of metrics to a Keystone gateway.
///
/// Each series of a double-valued counter or gauge becomes one event. Events are grouped into messages that respect
/// the configured size and count limits, and messages are published in order.
pub struct KeystoneExporter<P> {
    environment: EnvironmentDescriptor,
    splitter: MessageSplitter,
    publisher: P,
}

impl<P> KeystoneExporter<P>
where
    P: Publisher,
{
    pub(crate) fn new(environment: EnvironmentDescriptor, splitter: MessageSplitter, publisher: P) -> Self {
        Self { environment, splitter, publisher }
    }

    /// Returns the identity of the publishing host.
    pub fn environment(&self) -> &EnvironmentDescriptor {
        &self.environment
    }

    /// Returns the publisher.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Exports a batch of metrics.
    ///
    /// Metrics of kinds other than [`MetricKind::CumulativeDouble`] and [`MetricKind::GaugeDouble`] are logged and
    /// skipped, as are series that cannot be turned into an event. A batch with nothing left to publish is a no-op.
    ///
    /// # Errors
    ///
    /// If serializing or publishing a message fails, publishing stops and the error is returned. Messages published
    /// before the failure are not retracted.
    pub async fn consume_metrics(&self, metrics: &[Metric]) -> Result<(), Error> {
        let mut events = Vec::new();
        for metric in metrics {
            match metric.descriptor.kind {
                MetricKind::CumulativeDouble | MetricKind::GaugeDouble => {
                    events.extend(events_for_metric(&self.environment, metric));
                }
                kind => error!(metric_name = %metric.descriptor.name, %kind, "Unsupported metric kind, skipping."),
            }
        }

        if events.is_empty() {
            debug!("No events to publish.");
            return Ok(());
        }

        self.splitter.publish(&self.publisher, &events).await
    }
}
