// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Byte-exchange port and its HTTP adapter.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::error::Error as StdError;
use std::fmt;
use tracing::debug;

use crate::config::SessionConfig;

/// Send one request payload, receive one response body.
///
/// Implementations own timeouts; the dispatcher never retries.
pub trait Transport: Send + Sync {
    /// Exchange `payload` for the raw response body.
    fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self(payload)
    }
}

/// Opaque transport failure. Displays as, and downcasts to, the underlying
/// error.
pub struct TransportError {
    inner: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wrap any error (or message) as a transport failure.
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { inner: err.into() }
    }

    /// The underlying error, if it is an `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Unwrap the underlying error.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err)
    }
}

/// Blocking HTTP transport: one `POST <server_url><api_endpoint>` per call,
/// with the API credential headers set on every request.
///
/// Built on `reqwest::blocking`, so it must not be constructed or used
/// directly on an async executor thread; the async façade runs calls on
/// the blocking pool for that reason.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport for `config`.
    pub fn new(config: &SessionConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("ftrack-api-key", sensitive(&config.api_key)?);
        headers.insert("ftrack-user", header(&config.api_user)?);
        headers.insert("ftrack-clienttoken", header(&config.client_token)?);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.endpoint_url(),
        })
    }

    /// Request URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let response = self.client.post(&self.url).body(payload.to_vec()).send()?;
        let status = response.status();
        // Error descriptions arrive with non-2xx statuses; the body decides.
        let body = response.bytes()?;
        debug!(%status, bytes = body.len(), "response received");
        Ok(body.to_vec())
    }
}

fn header(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(TransportError::new)
}

fn sensitive(value: &str) -> Result<HeaderValue, TransportError> {
    let mut value = header(value)?;
    value.set_sensitive(true);
    Ok(value)
}
