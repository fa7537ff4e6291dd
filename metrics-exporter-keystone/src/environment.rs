use std::env;

use tracing::warn;

use crate::Error;

const STACK_VAR: &str = "NETFLIX_STACK";
const INSTANCE_ID_VAR: &str = "EC2_INSTANCE_ID";
const UNKNOWN_HOSTNAME: &str = "unknown_hostname";

/// Identity of the host publishing events.
///
/// Every event carries the stack and instance ID, and every message carries the hostname.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvironmentDescriptor {
    hostname: String,
    stack: String,
    instance_id: String,
}

impl EnvironmentDescriptor {
    /// Creates a new `EnvironmentDescriptor`.
    pub fn new<H, S, I>(hostname: H, stack: S, instance_id: I) -> Self
    where
        H: Into<String>,
        S: Into<String>,
        I: Into<String>,
    {
        Self { hostname: hostname.into(), stack: stack.into(), instance_id: instance_id.into() }
    }

    /// Reads the environment descriptor from the process environment.
    ///
    /// The stack is read from `NETFLIX_STACK` and the instance ID from `EC2_INSTANCE_ID`. The hostname is queried from
    /// the operating system, falling back to `unknown_hostname`.
    ///
    /// # Errors
    ///
    /// If either environment variable is not set, an error is returned.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok(), hostname())
    }

    fn from_lookup<F>(lookup: F, hostname: Option<String>) -> Result<Self, Error>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let stack = lookup(STACK_VAR).ok_or(Error::MissingEnvironment { name: STACK_VAR })?;
        let instance_id = lookup(INSTANCE_ID_VAR).ok_or(Error::MissingEnvironment { name: INSTANCE_ID_VAR })?;
        let hostname = hostname.unwrap_or_else(|| {
            warn!("Unable to determine hostname, using '{}'.", UNKNOWN_HOSTNAME);
            UNKNOWN_HOSTNAME.to_string()
        });

        Ok(Self { hostname, stack, instance_id })
    }

    /// Returns the hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the stack.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Returns the instance ID.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for writes of its full length, and `gethostname` writes at most that many bytes.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok().filter(|name| !name.is_empty())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::EnvironmentDescriptor;
    use crate::Error;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<_, _> = vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn reads_environment() {
        let vars = lookup(&[("NETFLIX_STACK", "main"), ("EC2_INSTANCE_ID", "i-0abc")]);
        let env = EnvironmentDescriptor::from_lookup(vars, Some("host-1".to_string())).unwrap();

        assert_eq!(env, EnvironmentDescriptor::new("host-1", "main", "i-0abc"));
    }

    #[test]
    fn unknown_hostname_fallback() {
        let vars = lookup(&[("NETFLIX_STACK", "main"), ("EC2_INSTANCE_ID", "i-0abc")]);
        let env = EnvironmentDescriptor::from_lookup(vars, None).unwrap();

        assert_eq!(env.hostname(), "unknown_hostname");
    }

    #[test]
    fn missing_variables() {
        let err = EnvironmentDescriptor::from_lookup(lookup(&[("EC2_INSTANCE_ID", "i-0abc")]), None).unwrap_err();
        assert!(matches!(err, Error::MissingEnvironment { name: "NETFLIX_STACK" }));

        let err = EnvironmentDescriptor::from_lookup(lookup(&[("NETFLIX_STACK", "main")]), None).unwrap_err();
        assert!(matches!(err, Error::MissingEnvironment { name: "EC2_INSTANCE_ID" }));
    }

    #[cfg(unix)]
    #[test]
    fn system_hostname() {
        assert!(super::hostname().is_some());
    }
}
