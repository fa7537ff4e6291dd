use std::time::Duration;

use http_body_util::{BodyExt, Collected, Full};
use hyper::{body::Bytes, header::CONTENT_TYPE, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::debug;

use crate::{publish::PublishFuture, Error, Publisher};

/// Publishes messages to the gateway over HTTP.
///
/// Each message is sent as the body of a `POST` request with a JSON content type. Anything other than `200 OK` is
/// treated as a failure.
#[derive(Clone, Debug)]
pub struct HttpPublisher {
    client: Client<HttpConnector, Full<Bytes>>,
    uri: Uri,
    timeout: Duration,
}

impl HttpPublisher {
    /// Creates a new `HttpPublisher` posting to `uri`.
    ///
    /// `timeout` bounds the entire exchange, from connecting to reading the response body.
    pub fn new(uri: Uri, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).pool_idle_timeout(Duration::from_secs(30)).build_http();

        Self { client, uri, timeout }
    }

    /// Returns the gateway URL.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    async fn post(&self, message: Vec<u8>) -> Result<(), Error> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::from(message))
            .map_err(|e| Error::InvalidRequest { reason: e.to_string() })?;

        let response = self.client.request(request).await.map_err(Error::Send)?;
        let status = response.status();
        if status == StatusCode::OK {
            debug!(uri = %self.uri, "Published message to gateway.");
            return Ok(());
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map(Collected::to_bytes)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_else(|_| String::from("<failed to read response body>"));

        Err(Error::UnexpectedStatus { uri: self.uri.clone(), status, body })
    }
}

impl Publisher for HttpPublisher {
    fn publish(&self, message: Vec<u8>) -> PublishFuture<'_> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.post(message)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.timeout)),
            }
        })
    }
}
