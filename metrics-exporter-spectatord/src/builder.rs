use std::{path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    adapter::Adapter,
    cache::AdapterCache,
    connector::{NamespaceConnector, TenantConnector},
    dialer::{self, DialOptions, Network},
    exporter::{Routing, SpectatordExporter},
    namespace::{EnvironmentDirResolver, NamespaceResolver, DEFAULT_ENVIRONMENT_ROOT, DEFAULT_NAMESPACE_FILE_NAME},
    telemetry::Telemetry,
    Error,
};

const DEFAULT_REMOTE_ADDRESS: &str = "localhost:1234";
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TENANT_LABEL: &str = "pod";

/// Errors that could occur while building a spectatord exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The eviction interval was zero.
    #[error("eviction interval must be greater than zero")]
    InvalidEvictionInterval,

    /// Failed to connect to spectatord when building a direct exporter.
    #[error("failed to connect to spectatord: {0}")]
    Dial(#[source] Error),
}

/// Builder for a spectatord exporter.
pub struct SpectatordBuilder {
    remote_addr: String,
    network: Network,
    dial_options: DialOptions,
    eviction_interval: Duration,
    tenant_label: String,
    namespace_root: PathBuf,
    namespace_file_name: String,
    resolver: Option<Box<dyn NamespaceResolver>>,
}

impl SpectatordBuilder {
    /// Set the remote address of spectatord.
    ///
    /// The address must be in the format of `<host>:<port>`. When exporting per tenant, the same address is dialed
    /// from within each tenant's network namespace.
    ///
    /// Defaults to `localhost:1234`.
    ///
    /// # Errors
    ///
    /// If the given address is not in the format of `<host>:<port>`, an error will be returned indicating the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let addr = addr.as_ref();
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| BuildError::InvalidRemoteAddress { reason: format!("'{}' has no port", addr) })?;
        if host.is_empty() {
            return Err(BuildError::InvalidRemoteAddress { reason: format!("'{}' has no host", addr) });
        }
        port.parse::<u16>()
            .map_err(|e| BuildError::InvalidRemoteAddress { reason: format!("invalid port '{}': {}", port, e) })?;

        self.remote_addr = addr.to_string();
        Ok(self)
    }

    /// Set the network used to reach spectatord.
    ///
    /// Over TCP, each datagram is terminated with a newline.
    ///
    /// Defaults to UDP.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the timeout for establishing a connection.
    ///
    /// Only applies to TCP, as connecting a UDP socket does not wait on the remote side.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_options.connect_timeout = timeout;
        self
    }

    /// Set the TCP keep-alive idle time, or disable keep-alive with `None`.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.dial_options.keep_alive = keep_alive;
        self
    }

    /// Set the write timeout.
    ///
    /// When the write timeout is reached, the datagram being written is dropped and the write fails.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dial_options.write_timeout = timeout;
        self
    }

    /// Set how often the per-tenant connection cache is cleared.
    ///
    /// Every cached connection is closed at each interval, and reopened on next use. This bounds how long a
    /// connection to a tenant that has gone away can linger.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Set the label identifying the tenant of each series.
    ///
    /// Defaults to `pod`.
    #[must_use]
    pub fn with_tenant_label<L>(mut self, label: L) -> Self
    where
        L: Into<String>,
    {
        self.tenant_label = label.into();
        self
    }

    /// Set the directory holding the per-tenant environment directories.
    ///
    /// Defaults to `/var/lib/titus-environments`.
    #[must_use]
    pub fn with_namespace_root<P>(mut self, root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.namespace_root = root.into();
        self
    }

    /// Set the name of the file, inside each tenant's environment directory, that holds the namespace path.
    ///
    /// Defaults to `netns`.
    #[must_use]
    pub fn with_namespace_file_name<N>(mut self, file_name: N) -> Self
    where
        N: Into<String>,
    {
        self.namespace_file_name = file_name.into();
        self
    }

    /// Set a custom resolver for tenant network namespaces.
    ///
    /// Overrides [`with_namespace_root`][Self::with_namespace_root] and
    /// [`with_namespace_file_name`][Self::with_namespace_file_name].
    #[must_use]
    pub fn with_namespace_resolver<R>(mut self, resolver: R) -> Self
    where
        R: NamespaceResolver + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Builds a per-tenant exporter.
    ///
    /// Each series is sent to the spectatord running in the network namespace of the tenant named by its tenant label.
    /// No connection is made until the first series for a tenant is exported.
    ///
    /// Telemetry counters are registered with the global recorder at this point, so any recorder meant to capture them
    /// must be installed first.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error will be returned.
    pub fn build(mut self) -> Result<SpectatordExporter, BuildError> {
        let resolver: Box<dyn NamespaceResolver> = match self.resolver.take() {
            Some(resolver) => resolver,
            None => Box::new(EnvironmentDirResolver::new(&self.namespace_root).with_file_name(&self.namespace_file_name)),
        };
        let connector =
            NamespaceConnector::new(resolver, self.network, self.remote_addr.clone(), self.dial_options.clone());

        self.build_with_connector(connector)
    }

    /// Builds a per-tenant exporter that opens connections through `connector`.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error will be returned.
    pub fn build_with_connector<C>(self, connector: C) -> Result<SpectatordExporter, BuildError>
    where
        C: TenantConnector + 'static,
    {
        if self.eviction_interval.is_zero() {
            return Err(BuildError::InvalidEvictionInterval);
        }

        let cache = AdapterCache::new(connector, self.eviction_interval);
        Ok(SpectatordExporter::new(Routing::PerTenant { cache, tenant_label: self.tenant_label }))
    }

    /// Builds an exporter sending every series to a single spectatord, reached from the current network namespace.
    ///
    /// The connection is made immediately.
    ///
    /// # Errors
    ///
    /// If the connection cannot be established, an error will be returned.
    pub fn build_direct(self) -> Result<SpectatordExporter, BuildError> {
        let connection = dialer::dial(self.network, &self.remote_addr, &self.dial_options).map_err(BuildError::Dial)?;
        let adapter = Arc::new(Adapter::new(connection, Telemetry::new("direct")));

        Ok(SpectatordExporter::new(Routing::Direct { adapter, address: self.remote_addr }))
    }
}

impl Default for SpectatordBuilder {
    fn default() -> Self {
        SpectatordBuilder {
            remote_addr: DEFAULT_REMOTE_ADDRESS.to_string(),
            network: Network::Udp,
            dial_options: DialOptions {
                connect_timeout: DEFAULT_DIAL_TIMEOUT,
                keep_alive: Some(DEFAULT_KEEP_ALIVE),
                write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            },
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            tenant_label: DEFAULT_TENANT_LABEL.to_string(),
            namespace_root: PathBuf::from(DEFAULT_ENVIRONMENT_ROOT),
            namespace_file_name: DEFAULT_NAMESPACE_FILE_NAME.to_string(),
            resolver: None,
        }
    }
}
