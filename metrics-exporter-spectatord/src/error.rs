use std::{fmt::Write as _, io, path::PathBuf};

use metrics_record::{LabelMismatch, MetricKind};
use thiserror::Error;

use crate::dialer::Network;

/// Errors that could occur while exporting metrics to spectatord.
#[derive(Debug, Error)]
pub enum Error {
    /// The tenant has no network namespace handle, most likely because it has already been torn down.
    #[error("unknown isolation domain: no network namespace at {}", path.display())]
    UnknownIsolationDomain {
        /// Path that was expected to hold the namespace handle.
        path: PathBuf,
    },

    /// The tenant identifier cannot be used to locate a namespace handle.
    #[error("invalid tenant identifier '{tenant}'")]
    InvalidTenant {
        /// The offending tenant identifier.
        tenant: String,
    },

    /// The namespace handle exists but could not be inspected.
    #[error("failed to inspect network namespace handle {}: {source}", path.display())]
    Namespace {
        /// Path of the namespace handle.
        path: PathBuf,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Switching between network namespaces failed.
    #[error("unable to {action} network namespace: {source}")]
    NamespaceSwitch {
        /// The step that failed: `save`, `open`, `enter`, or `restore`.
        action: &'static str,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Dialing the remote address failed.
    #[error("failed to dial {network} address '{address}': {source}")]
    Dial {
        /// Network that was dialed.
        network: Network,

        /// Address that was dialed.
        address: String,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Namespace-scoped dialing is not available on this platform.
    #[error("network namespace dialing is not supported on this platform")]
    Unsupported,

    /// Writing a datagram to the connection failed.
    #[error("failed to write spectatord message: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The connection was closed by the adapter cache before the write.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Closing a connection failed.
    #[error("failed to close connection for '{tenant}': {source}")]
    Close {
        /// Tenant the connection belonged to, or the remote address when exporting to a single spectatord.
        tenant: String,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The background eviction thread could not be spawned.
    #[error("failed to spawn adapter eviction thread: {source}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A series did not carry exactly one point.
    #[error("skipping update, unexpected number of points in metric '{metric}': {count}")]
    UnexpectedPointCount {
        /// Metric name.
        metric: String,

        /// Number of points present.
        count: usize,
    },

    /// A point carried a value that does not match the metric kind.
    #[error("skipping update, metric '{metric}' of kind {kind} carried a {found} value")]
    UnexpectedValue {
        /// Metric name.
        metric: String,

        /// Kind declared by the descriptor.
        kind: MetricKind,

        /// Variant of the value actually present.
        found: &'static str,
    },

    /// A summary point had no percentile snapshot.
    #[error("skipping update, summary metric '{metric}' has no percentile snapshot")]
    MissingSnapshot {
        /// Metric name.
        metric: String,
    },

    /// Label keys and values did not line up.
    #[error(transparent)]
    Labels(#[from] LabelMismatch),

    /// The series did not carry the label used to identify its tenant.
    #[error("failed to find '{label}' label for metric '{metric}'")]
    MissingTenant {
        /// Label that identifies the tenant.
        label: String,

        /// Metric name.
        metric: String,
    },

    /// Several operations failed.
    #[error("{}", display_multiple(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Returns the individual errors held by this error.
    ///
    /// For [`Error::Multiple`], this is every aggregated error. Otherwise, it is a slice containing only `self`.
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}

fn display_multiple(errors: &[Error]) -> String {
    let mut out = String::new();
    let _ = write!(out, "{} errors occurred:", errors.len());
    for error in errors {
        let _ = write!(out, "\n\t* {}", error);
    }
    out
}

/// Collects errors from independent operations so that one failure does not abort its siblings.
#[derive(Debug, Default)]
pub(crate) struct ErrorList {
    errors: Vec<Error>,
}

impl ErrorList {
    /// Adds an error, flattening it if it is itself an aggregate.
    pub fn push(&mut self, error: Error) {
        match error {
            Error::Multiple(errors) => self.errors.extend(errors),
            error => self.errors.push(error),
        }
    }

    /// Adds the error from `result`, if any.
    pub fn record(&mut self, result: Result<(), Error>) {
        if let Err(e) = result {
            self.push(e);
        }
    }

    /// Converts the collected errors into a result.
    ///
    /// No errors yields `Ok(())`, a single error is returned as-is, and anything more is wrapped in
    /// [`Error::Multiple`].
    pub fn into_result(mut self) -> Result<(), Error> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Multiple(self.errors)),
        }
    }
}
