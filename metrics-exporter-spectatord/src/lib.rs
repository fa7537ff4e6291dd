//! An exporter for sending pipeline metrics to [spectatord], either to a single instance or to one instance per
//! tenant, each reached from within the tenant's own network namespace.
//!
//! [spectatord]: https://github.com/Netflix-Skunkworks/spectatord
//!
//! # Usage
//!
//! ```no_run
//! # use metrics_exporter_spectatord::SpectatordBuilder;
//! # use metrics_record::Metric;
//! # fn batch() -> Vec<Metric> { Vec::new() }
//! // First, create a builder.
//! //
//! // The builder can configure the remote address, timeouts, how often cached connections are recycled, and which
//! // label identifies the tenant of each series.
//! let mut exporter = SpectatordBuilder::default()
//!     .with_tenant_label("pod")
//!     .build()
//!     .expect("failed to build exporter");
//!
//! // Starting the exporter enables periodic recycling of per-tenant connections.
//! exporter.start().expect("failed to start exporter");
//!
//! // Batches of metrics can then be exported from any number of threads.
//! if let Err(e) = exporter.consume_metrics(&batch()) {
//!     eprintln!("some series were not exported: {}", e);
//! }
//!
//! // Shutting down closes every connection.
//! exporter.shutdown().expect("failed to close connections");
//! ```
//!
//! # Wire format
//!
//! Each measurement is a single datagram in the spectatord line protocol:
//!
//! ```text
//! g:cpu.utilization,pod=abc:42.5
//! ```
//!
//! Counters and gauges map to a single datagram. Summaries are written as one gauge per percentile, tagged with
//! `percentile`. Cumulative distributions are written as one counter per bucket, tagged with the bucket's upper bound
//! (or `Inf` for the overflow bucket), followed by a counter tagged `statistic=totalTime` carrying the sum. Other metric
//! kinds are skipped.
//!
//! # Tenants
//!
//! In per-tenant mode, each series must carry the tenant label. The tenant's network namespace is located through a
//! [`NamespaceResolver`], by default reading `/var/lib/titus-environments/<tenant>/netns`, and the remote address is
//! dialed from inside that namespace. Connections are cached per tenant and the whole cache is cleared on a fixed
//! interval, so that connections to tenants that have gone away are eventually closed.
//!
//! Entering a network namespace requires `CAP_SYS_ADMIN`, and is only supported on Linux.
//!
//! # Delivery
//!
//! Delivery is best-effort: a failed write drops the datagram and is reported as an error for the batch, but is never
//! retried.
//!
//! # Telemetry
//!
//! The exporter reports its own operation through the [`metrics`] facade, under the `spectatord.exporter` namespace:
//! datagrams and bytes sent, failed writes, dropped records, and adapters created, evicted, or failing to connect. The
//! counters are registered when the exporter is built, so a recorder meant to capture them must be installed first.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod adapter;
pub use self::adapter::Adapter;

mod builder;
pub use self::builder::{BuildError, SpectatordBuilder};

mod cache;
pub use self::cache::AdapterCache;

mod connector;
pub use self::connector::{NamespaceConnector, TenantConnector};

mod dialer;
pub use self::dialer::{dial, Connection, DialOptions, NamespaceDialer, Network};

mod error;
pub use self::error::Error;

mod exporter;
pub use self::exporter::SpectatordExporter;

mod namespace;
pub use self::namespace::{
    EnvironmentDirResolver, NamespaceResolver, DEFAULT_ENVIRONMENT_ROOT, DEFAULT_NAMESPACE_FILE_NAME,
};

pub mod protocol;

mod telemetry;
