//! An exporter for publishing pipeline metrics as batches of JSON events to a Keystone HTTP gateway.
//!
//! # Usage
//!
//! ```no_run
//! # use metrics_exporter_keystone::KeystoneBuilder;
//! # use metrics_record::Metric;
//! # fn batch() -> Vec<Metric> { Vec::new() }
//! # async fn run() -> Result<(), metrics_exporter_keystone::Error> {
//! // The gateway is derived from `EC2_REGION` and `NETFLIX_ENVIRONMENT`, and the host identity from `NETFLIX_STACK`,
//! // `EC2_INSTANCE_ID`, and the system hostname.
//! let exporter = KeystoneBuilder::default().with_gateway_from_env()?.build()?;
//!
//! // Exporting must happen on a Tokio runtime.
//! exporter.consume_metrics(&batch()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Events
//!
//! Only double-valued counters and gauges are exported. Each of their series becomes one event:
//!
//! ```json
//! {
//!   "uuid": "3b0c2a0e-5f4e-4d5e-9a44-2f1b8a4f6c11",
//!   "payload": {
//!     "ec2_instance_id": "i-0abc",
//!     "stack": "main",
//!     "version": "v1",
//!     "name": "cpu.utilization",
//!     "type": "GAUGE_DOUBLE",
//!     "metadata": { "pod": "abc", "node": "MISSING" },
//!     "point": { "seconds": 1600000000, "nanos": 0, "value": 42.5 }
//!   }
//! }
//! ```
//!
//! Labels without a value are reported as `MISSING`. Series that do not carry exactly one floating-point point are
//! logged and skipped.
//!
//! # Messages
//!
//! Events are posted in messages of the form `{"appName": ..., "hostname": ..., "ack": false, "event": [...]}`. A batch
//! is first cut into groups of at most the maximum event count, and any group whose message reaches the maximum message
//! size is split in half until it fits. Messages are published in order, and publishing stops at the first failure.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::KeystoneBuilder;

mod environment;
pub use self::environment::EnvironmentDescriptor;

mod error;
pub use self::error::Error;

mod event;
pub use self::event::{events_for_metric, Event, EventPoint, Payload};

mod exporter;
pub use self::exporter::KeystoneExporter;

mod http;
pub use self::http::HttpPublisher;

mod publish;
pub use self::publish::{PublishFuture, Publisher};
