//! Minimal HTTP client abstraction shared across crates.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;

/// Connection and socket timeouts for one exchange.
///
/// Travels in the request's extensions; transports that cannot honor one of them ignore
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeouts {
    /// Time allowed to establish the connection
    pub connect: Duration,
    /// Time allowed for the whole exchange once connected
    pub socket: Duration,
}

impl Timeouts {
    /// 20 seconds each.
    pub const DEFAULT: Self = Self {
        connect: Duration::from_secs(20),
        socket: Duration::from_secs(20),
    };

    /// Timeouts attached to `request`, if any.
    pub fn of<B>(request: &http::Request<B>) -> Option<Self> {
        request.extensions().get::<Self>().copied()
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// HTTP client trait for sending raw HTTP requests.
#[trait_variant::make(Send)]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + Into<TransportError> + 'static;

    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
async fn exchange(
    client: &reqwest::Client,
    request: http::Request<Vec<u8>>,
) -> Result<http::Response<Vec<u8>>, reqwest::Error> {
    let timeouts = Timeouts::of(&request);
    let (parts, body) = request.into_parts();

    let mut req = client
        .request(parts.method, parts.uri.to_string())
        .headers(parts.headers)
        .body(body);
    if let Some(timeouts) = timeouts {
        req = req.timeout(timeouts.socket);
    }

    let resp = req.send().await?;

    let status = resp.status();
    let version = resp.version();
    let headers = resp.headers().clone();
    let body = resp.bytes().await?.to_vec();

    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Honors the socket timeout per request; the connect timeout is whatever the client
/// was built with.
#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        exchange(self, request).await
    }
}

/// reqwest transport honoring both timeouts of every request.
///
/// reqwest fixes the connect timeout when a client is built, so this keeps one pooled
/// client per distinct connect timeout.
#[cfg(feature = "reqwest-client")]
#[derive(Debug, Default, Clone)]
pub struct ReqwestClient {
    clients: Arc<dashmap::DashMap<Duration, reqwest::Client>>,
}

#[cfg(feature = "reqwest-client")]
impl ReqwestClient {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, connect: Duration) -> Result<reqwest::Client, reqwest::Error> {
        if let Some(client) = self.clients.get(&connect) {
            return Ok(client.clone());
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(?connect, "building pooled reqwest client");
        let client = reqwest::Client::builder().connect_timeout(connect).build()?;
        Ok(self.clients.entry(connect).or_insert(client).clone())
    }
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for ReqwestClient {
    type Error = reqwest::Error;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        let connect = Timeouts::of(&request).unwrap_or_default().connect;
        let client = self.client_for(connect)?;
        exchange(&client, request).await
    }
}

impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }
}
