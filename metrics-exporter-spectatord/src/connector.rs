use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    dialer::{Connection, DialOptions, NamespaceDialer, Network},
    namespace::NamespaceResolver,
    Error,
};

/// Opens connections to spectatord on behalf of a tenant.
#[cfg_attr(test, mockall::automock)]
pub trait TenantConnector: Send + Sync {
    /// Opens a new connection for `tenant`.
    ///
    /// # Errors
    ///
    /// If the tenant is unknown or the connection cannot be established, an error is returned.
    fn connect(&self, tenant: &str) -> Result<Connection, Error>;
}

impl<C> TenantConnector for Arc<C>
where
    C: TenantConnector + ?Sized,
{
    fn connect(&self, tenant: &str) -> Result<Connection, Error> {
        (**self).connect(tenant)
    }
}

/// Connects to a spectatord instance running inside each tenant's own network namespace.
///
/// The same remote address is dialed for every tenant, but from within the tenant's namespace, so each tenant reaches
/// its own spectatord.
pub struct NamespaceConnector<R> {
    resolver: R,
    network: Network,
    address: String,
    options: DialOptions,
}

impl<R> NamespaceConnector<R> {
    /// Creates a new `NamespaceConnector`.
    pub fn new(resolver: R, network: Network, address: String, options: DialOptions) -> Self {
        Self { resolver, network, address, options }
    }
}

impl<R> TenantConnector for NamespaceConnector<R>
where
    R: NamespaceResolver,
{
    fn connect(&self, tenant: &str) -> Result<Connection, Error> {
        let namespace = self.resolver.resolve(tenant)?;
        debug!(tenant, namespace = %namespace.display(), network = %self.network, address = self.address, "Dialing spectatord in tenant namespace.");

        NamespaceDialer::new(namespace, self.options.clone())?.dial(self.network, &self.address)
    }
}

impl<R> fmt::Debug for NamespaceConnector<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceConnector")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
