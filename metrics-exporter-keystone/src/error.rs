use std::time::Duration;

use hyper::{StatusCode, Uri};
use metrics_record::{LabelMismatch, MetricKind};
use thiserror::Error;

/// Errors that could occur while building events or publishing them to the gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// A required environment variable is not set.
    #[error("environment variable '{name}' is not set")]
    MissingEnvironment {
        /// Name of the variable.
        name: &'static str,
    },

    /// No gateway was configured.
    #[error("no gateway URL configured")]
    MissingGateway,

    /// The gateway URL could not be parsed.
    #[error("invalid gateway URL '{url}': {reason}")]
    InvalidGatewayUrl {
        /// The offending URL.
        url: String,

        /// Details about the parsing failure.
        reason: String,
    },

    /// A series did not carry exactly one point.
    #[error("unexpected point count in metric '{metric}': {count} != 1")]
    UnexpectedPointCount {
        /// Metric name.
        metric: String,

        /// Number of points present.
        count: usize,
    },

    /// A point did not carry a floating-point value.
    #[error("metric '{metric}' of kind {kind} carried a {found} value")]
    UnexpectedValue {
        /// Metric name.
        metric: String,

        /// Kind declared by the descriptor.
        kind: MetricKind,

        /// Variant of the value actually present.
        found: &'static str,
    },

    /// A point was timestamped before the Unix epoch.
    #[error("point in metric '{metric}' predates the Unix epoch")]
    InvalidTimestamp {
        /// Metric name.
        metric: String,
    },

    /// Label keys and values did not line up.
    #[error(transparent)]
    Labels(#[from] LabelMismatch),

    /// A message was to be published without any events.
    #[error("no events provided for construction of message")]
    NoEvents,

    /// A single event does not fit in a message.
    #[error("event of {size} bytes does not fit in the maximum message size of {limit} bytes")]
    EventTooLarge {
        /// Size of the message holding only this event.
        size: usize,

        /// Maximum message size.
        limit: usize,
    },

    /// A message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The gateway request could not be built.
    #[error("failed to build gateway request: {reason}")]
    InvalidRequest {
        /// Details about the failure.
        reason: String,
    },

    /// Sending the request to the gateway failed.
    #[error("error sending request to gateway: {0}")]
    Send(#[source] hyper_util::client::legacy::Error),

    /// The gateway did not respond in time.
    #[error("request to gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway responded with a status other than `200 OK`.
    #[error("post to gateway failed, gateway URL: {uri}, status: {status}, response: {body}")]
    UnexpectedStatus {
        /// Gateway URL.
        uri: Uri,

        /// Response status.
        status: StatusCode,

        /// Response body.
        body: String,
    },
}
