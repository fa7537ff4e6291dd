use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::trace;

use crate::Error;

/// Default directory holding one environment directory per tenant.
pub const DEFAULT_ENVIRONMENT_ROOT: &str = "/var/lib/titus-environments";

/// Default name of the file, inside a tenant's environment directory, that holds its network namespace path.
pub const DEFAULT_NAMESPACE_FILE_NAME: &str = "netns";

/// Maps a tenant identifier to the path of its network namespace handle.
#[cfg_attr(test, mockall::automock)]
pub trait NamespaceResolver: Send + Sync {
    /// Resolves the namespace handle for `tenant`.
    ///
    /// # Errors
    ///
    /// If the tenant is not known, [`Error::UnknownIsolationDomain`] should be returned, so that callers can tell a
    /// torn-down tenant apart from an I/O failure.
    fn resolve(&self, tenant: &str) -> Result<PathBuf, Error>;
}

impl<R> NamespaceResolver for Box<R>
where
    R: NamespaceResolver + ?Sized,
{
    fn resolve(&self, tenant: &str) -> Result<PathBuf, Error> {
        (**self).resolve(tenant)
    }
}

/// Resolves namespaces through per-tenant environment directories.
///
/// For a tenant `t`, the file `<root>/t/<file name>` holds the path of the tenant's network namespace handle.
#[derive(Clone, Debug)]
pub struct EnvironmentDirResolver {
    root: PathBuf,
    file_name: String,
}

impl EnvironmentDirResolver {
    /// Creates a new `EnvironmentDirResolver` rooted at `root`.
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into(), file_name: DEFAULT_NAMESPACE_FILE_NAME.to_string() }
    }

    /// Sets the name of the file holding the namespace path.
    #[must_use]
    pub fn with_file_name<N>(mut self, file_name: N) -> Self
    where
        N: Into<String>,
    {
        self.file_name = file_name.into();
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_file(&self, tenant: &str) -> Result<PathBuf, Error> {
        // Tenant identifiers come from metric labels and must not escape the root.
        if tenant.is_empty() || tenant == "." || tenant.contains('/') || tenant.contains("..") {
            return Err(Error::InvalidTenant { tenant: tenant.to_string() });
        }

        Ok(self.root.join(tenant).join(&self.file_name))
    }
}

impl Default for EnvironmentDirResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ENVIRONMENT_ROOT)
    }
}

impl NamespaceResolver for EnvironmentDirResolver {
    fn resolve(&self, tenant: &str) -> Result<PathBuf, Error> {
        let path = self.namespace_file(tenant)?;

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::UnknownIsolationDomain { path }),
            Err(source) => return Err(Error::Namespace { path, source }),
        };

        let namespace = contents.trim();
        if namespace.is_empty() {
            return Err(Error::UnknownIsolationDomain { path });
        }

        trace!(tenant, namespace, "Resolved tenant network namespace.");
        Ok(PathBuf::from(namespace))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::{EnvironmentDirResolver, NamespaceResolver as _};
    use crate::Error;

    fn write_namespace(root: &std::path::Path, tenant: &str, file: &str, contents: &str) {
        let dir = root.join(tenant);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn resolves_trimmed_path() {
        let root = tempfile::tempdir().unwrap();
        write_namespace(root.path(), "pod-1", "netns", "/proc/1234/ns/net\n");

        let resolver = EnvironmentDirResolver::new(root.path());
        assert_eq!(resolver.resolve("pod-1").unwrap(), PathBuf::from("/proc/1234/ns/net"));
    }

    #[test]
    fn custom_file_name() {
        let root = tempfile::tempdir().unwrap();
        write_namespace(root.path(), "pod-1", "network", "/run/netns/pod-1");

        let resolver = EnvironmentDirResolver::new(root.path()).with_file_name("network");
        assert_eq!(resolver.resolve("pod-1").unwrap(), PathBuf::from("/run/netns/pod-1"));
    }

    #[test]
    fn unknown_tenant() {
        let root = tempfile::tempdir().unwrap();
        let resolver = EnvironmentDirResolver::new(root.path());

        match resolver.resolve("pod-2").unwrap_err() {
            Error::UnknownIsolationDomain { path } => assert_eq!(path, root.path().join("pod-2").join("netns")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn empty_namespace_file_is_unknown() {
        let root = tempfile::tempdir().unwrap();
        write_namespace(root.path(), "pod-1", "netns", "  \n");

        let resolver = EnvironmentDirResolver::new(root.path());
        assert!(matches!(resolver.resolve("pod-1"), Err(Error::UnknownIsolationDomain { .. })));
    }

    #[test]
    fn unreadable_namespace_file() {
        let root = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as a string.
        fs::create_dir_all(root.path().join("pod-1").join("netns")).unwrap();

        let resolver = EnvironmentDirResolver::new(root.path());
        assert!(matches!(resolver.resolve("pod-1"), Err(Error::Namespace { .. })));
    }

    #[test]
    fn rejects_escaping_tenants() {
        let resolver = EnvironmentDirResolver::default();
        for tenant in ["", ".", "..", "../etc", "a/b"] {
            assert!(matches!(resolver.resolve(tenant), Err(Error::InvalidTenant { .. })), "tenant {:?}", tenant);
        }
    }
}
