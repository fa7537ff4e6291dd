use std::{env, time::Duration};

use hyper::Uri;

use crate::{
    http::HttpPublisher, publish::MessageSplitter, EnvironmentDescriptor, Error, KeystoneExporter, Publisher,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_MESSAGE_SIZE: usize = 9_000_000;
const DEFAULT_MAX_EVENT_COUNT: usize = 16_000;
const DEFAULT_APP_NAME: &str = "otel-contrib-collector.service";
const DEFAULT_STREAM: &str = "titus_container_system_metrics";

const REGION_VAR: &str = "EC2_REGION";
const ENVIRONMENT_VAR: &str = "NETFLIX_ENVIRONMENT";

/// Builder for a Keystone exporter.
pub struct KeystoneBuilder {
    gateway: Option<Uri>,
    environment: Option<EnvironmentDescriptor>,
    request_timeout: Duration,
    max_message_size: usize,
    max_event_count: usize,
    app_name: String,
}

impl KeystoneBuilder {
    /// Set the URL events are posted to.
    ///
    /// # Errors
    ///
    /// If the URL cannot be parsed, or is not an absolute `http` URL, an error will be returned.
    pub fn with_gateway_url<U>(mut self, url: U) -> Result<Self, Error>
    where
        U: AsRef<str>,
    {
        let url = url.as_ref();
        let uri = url
            .parse::<Uri>()
            .map_err(|e| Error::InvalidGatewayUrl { url: url.to_string(), reason: e.to_string() })?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(scheme) => {
                return Err(Error::InvalidGatewayUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                })
            }
            None => return Err(Error::InvalidGatewayUrl { url: url.to_string(), reason: "missing scheme".to_string() }),
        }

        self.gateway = Some(uri);
        Ok(self)
    }

    /// Set the gateway from its region, environment and stream.
    ///
    /// Events are posted to `http://ksgateway-<region>.<environment>.netflix.net/REST/v1/stream/<stream>`.
    ///
    /// # Errors
    ///
    /// If the resulting URL cannot be parsed, an error will be returned.
    pub fn with_gateway_for(self, region: &str, environment: &str, stream: &str) -> Result<Self, Error> {
        self.with_gateway_url(format!("http://ksgateway-{}.{}.netflix.net/REST/v1/stream/{}", region, environment, stream))
    }

    /// Set the gateway from the process environment.
    ///
    /// The region is read from `EC2_REGION` and the environment from `NETFLIX_ENVIRONMENT`. Events are posted to the
    /// `titus_container_system_metrics` stream.
    ///
    /// # Errors
    ///
    /// If either environment variable is not set, an error will be returned.
    pub fn with_gateway_from_env(self) -> Result<Self, Error> {
        let region = env::var(REGION_VAR).map_err(|_| Error::MissingEnvironment { name: REGION_VAR })?;
        let environment = env::var(ENVIRONMENT_VAR).map_err(|_| Error::MissingEnvironment { name: ENVIRONMENT_VAR })?;
        self.with_gateway_for(&region, &environment, DEFAULT_STREAM)
    }

    /// Set the identity of the publishing host.
    ///
    /// Defaults to [`EnvironmentDescriptor::from_env`], read when the exporter is built.
    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentDescriptor) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Set the timeout of each request to the gateway.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum size of a single message, in bytes.
    ///
    /// Batches whose serialized form reaches this size are split until every message is smaller.
    ///
    /// Defaults to 9,000,000 bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set the maximum number of events in a single message.
    ///
    /// Defaults to 16,000.
    #[must_use]
    pub fn with_max_event_count(mut self, max_event_count: usize) -> Self {
        self.max_event_count = max_event_count;
        self
    }

    /// Set the application name reported in every message.
    ///
    /// Defaults to `otel-contrib-collector.service`.
    #[must_use]
    pub fn with_app_name<N>(mut self, app_name: N) -> Self
    where
        N: Into<String>,
    {
        self.app_name = app_name.into();
        self
    }

    /// Builds the exporter, posting to the configured gateway over HTTP.
    ///
    /// # Errors
    ///
    /// If no gateway was configured, or the environment was not set and cannot be read from the process environment,
    /// an error will be returned.
    pub fn build(self) -> Result<KeystoneExporter<HttpPublisher>, Error> {
        let uri = self.gateway.clone().ok_or(Error::MissingGateway)?;
        let publisher = HttpPublisher::new(uri, self.request_timeout);
        self.build_with_publisher(publisher)
    }

    /// Builds the exporter, handing every message to `publisher`.
    ///
    /// The configured gateway and request timeout are not used.
    ///
    /// # Errors
    ///
    /// If the environment was not set and cannot be read from the process environment, an error will be returned.
    pub fn build_with_publisher<P>(self, publisher: P) -> Result<KeystoneExporter<P>, Error>
    where
        P: Publisher,
    {
        let environment = match self.environment {
            Some(environment) => environment,
            None => EnvironmentDescriptor::from_env()?,
        };
        let splitter = MessageSplitter {
            app_name: self.app_name,
            hostname: environment.hostname().to_string(),
            max_message_size: self.max_message_size,
            max_event_count: self.max_event_count,
        };

        Ok(KeystoneExporter::new(environment, splitter, publisher))
    }
}

impl Default for KeystoneBuilder {
    fn default() -> Self {
        KeystoneBuilder {
            gateway: None,
            environment: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_event_count: DEFAULT_MAX_EVENT_COUNT,
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }
}
