//! Single-use HTTP channels.
//!
//! A channel collects headers, timeouts and an entity for one exchange, then is consumed
//! by [`send`](HttpChannel::send). [`ClientChannel`] talks to an [`HttpClient`];
//! [`AuthorizationChannel`] decorates any channel with an `Authorization` header computed
//! from exactly what will be sent.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use crest_common::http_client::{HttpClient, Timeouts};
use crest_common::{
    Authorization, AuthorizationToken, ClientError, DecodeError, EncodeError, EncodedPair, TransportError,
};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use url::Url;

use crate::entity::HttpEntity;

/// One HTTP exchange in the making.
#[trait_variant::make(Send)]
pub trait HttpChannel {
    /// Request method.
    fn method(&self) -> &Method;

    /// Full request URL, query included.
    fn url(&self) -> &Url;

    /// Replace all values of `name`.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Add a value to `name`, keeping existing ones.
    fn add_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Connect and socket timeouts for this exchange.
    fn set_timeouts(&mut self, timeouts: Timeouts);

    /// Attach the request body.
    fn write_entity(&mut self, entity: HttpEntity) -> Result<(), ClientError>;

    /// Perform the exchange.
    async fn send(self) -> Result<HttpResource, ClientError>;
}

/// The raw result of a channel exchange.
#[derive(Debug, Clone)]
pub struct HttpResource {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResource {
    /// Undecoded response parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase for the status, if it has one.
    pub fn status_message(&self) -> Option<&'static str> {
        self.status.canonical_reason()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw `Content-Type` header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    /// `Content-Encoding` still applied to the body, if any.
    pub fn content_encoding(&self) -> Option<&str> {
        self.header(header::CONTENT_ENCODING)
    }

    fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Undo any `gzip`/`deflate` content-encoding the transport left in place.
    fn decode_content(mut self) -> Result<Self, DecodeError> {
        let Some(encoding) = self.content_encoding().map(|e| e.trim().to_ascii_lowercase())
        else {
            return Ok(self);
        };
        let decoded = match encoding.as_str() {
            "gzip" | "x-gzip" => read_all(GzDecoder::new(self.body.as_ref())),
            // Servers disagree on whether "deflate" means zlib-wrapped or raw.
            "deflate" => read_all(ZlibDecoder::new(self.body.as_ref()))
                .or_else(|_| read_all(DeflateDecoder::new(self.body.as_ref()))),
            _ => return Ok(self),
        }
        .map_err(|source| DecodeError::ContentEncoding {
            encoding: encoding.as_str().into(),
            source,
        })?;

        self.headers.remove(header::CONTENT_ENCODING);
        self.headers.remove(header::CONTENT_LENGTH);
        self.body = Bytes::from(decoded);
        Ok(self)
    }
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// Render `entity` on the blocking pool; writers may read files.
async fn render(entity: HttpEntity) -> Result<Bytes, ClientError> {
    let rendered = tokio::task::spawn_blocking(move || entity.to_bytes())
        .await
        .map_err(|e| EncodeError::Io(std::io::Error::other(e)))?;
    Ok(rendered?)
}

/// Channel backed by an [`HttpClient`].
pub struct ClientChannel<'c, C> {
    client: &'c C,
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeouts: Option<Timeouts>,
    entity: Option<HttpEntity>,
}

impl<'c, C: HttpClient + Sync> ClientChannel<'c, C> {
    /// Channel for one exchange of `method` on `url`.
    pub fn open(client: &'c C, method: Method, url: Url) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            timeouts: None,
            entity: None,
        }
    }

    fn into_http_request(
        self,
        body: Option<Bytes>,
    ) -> Result<http::Request<Vec<u8>>, ClientError> {
        let mut headers = self.headers;
        if let Some(entity) = &self.entity {
            if !headers.contains_key(header::CONTENT_TYPE) {
                let content_type = HeaderValue::try_from(entity.content_type())
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                headers.insert(header::CONTENT_TYPE, content_type);
            }
        }
        let body = body.map(|b| b.to_vec()).unwrap_or_default();

        let mut request = http::Request::builder()
            .method(self.method)
            .uri(self.url.as_str())
            .body(body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        *request.headers_mut() = headers;
        if let Some(timeouts) = self.timeouts {
            request.extensions_mut().insert(timeouts);
        }
        Ok(request)
    }
}

impl<C: HttpClient + Sync> HttpChannel for ClientChannel<'_, C> {
    fn method(&self) -> &Method {
        &self.method
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = Some(timeouts);
    }

    fn write_entity(&mut self, entity: HttpEntity) -> Result<(), ClientError> {
        self.entity = Some(entity);
        Ok(())
    }

    async fn send(self) -> Result<HttpResource, ClientError> {
        let client = self.client;
        let body = match self.entity.clone() {
            Some(entity) => Some(render(entity).await?),
            None => None,
        };
        let request = self.into_http_request(body)?;
        let response = client
            .send_http(request)
            .await
            .map_err(|e| ClientError::Transport(e.into()))?;

        let (parts, body) = response.into_parts();
        let resource = HttpResource::new(parts.status, parts.headers, Bytes::from(body));
        Ok(resource.decode_content()?)
    }
}

/// Signs whatever the inner channel is about to send.
///
/// The entity is made replayable on arrival, so signing can read url-encoded body
/// parameters without the inner channel writing the data source a second time.
pub struct AuthorizationChannel<Ch> {
    inner: Ch,
    authorization: Arc<dyn Authorization>,
    entity: Option<HttpEntity>,
}

impl<Ch: HttpChannel> AuthorizationChannel<Ch> {
    /// Sign requests sent through `inner` with `authorization`.
    pub fn new(inner: Ch, authorization: Arc<dyn Authorization>) -> Self {
        Self {
            inner,
            authorization,
            entity: None,
        }
    }

    /// Query parameters plus, when the scheme signs this entity type, body parameters.
    fn signed_params(&self, body: Option<&[u8]>) -> Vec<EncodedPair> {
        let query = self.inner.url().query_pairs();
        let form = body.into_iter().flat_map(url::form_urlencoded::parse);
        query
            .chain(form)
            .map(|(name, value)| EncodedPair::new(name.as_ref(), value.into_owned(), false))
            .collect()
    }

    /// The entity, when the scheme signs its body parameters.
    fn signed_entity(&self) -> Option<HttpEntity> {
        self.entity
            .clone()
            .filter(|entity| self.authorization.signs_entity(Some(entity.content_type().as_str())))
    }

    /// Sign and send, returning the token the request carried alongside the outcome.
    ///
    /// The token is `None` only when signing itself failed.
    pub async fn send_signed(
        mut self,
    ) -> (Option<AuthorizationToken>, Result<HttpResource, ClientError>) {
        let body = match self.signed_entity() {
            Some(entity) => match render(entity).await {
                Ok(body) => Some(body),
                Err(e) => return (None, Err(e)),
            },
            None => None,
        };
        let params = self.signed_params(body.as_deref());
        let token = match self
            .authorization
            .authorize(self.inner.method(), self.inner.url(), &params)
            .await
        {
            Ok(token) => token,
            Err(e) => return (None, Err(e.into())),
        };
        let result = match token.header_value() {
            Ok(value) => {
                self.inner.set_header(header::AUTHORIZATION, value);
                self.inner.send().await
            }
            Err(e) => Err(e.into()),
        };
        (Some(token), result)
    }
}

impl<Ch: HttpChannel + Send> HttpChannel for AuthorizationChannel<Ch> {
    fn method(&self) -> &Method {
        self.inner.method()
    }

    fn url(&self) -> &Url {
        self.inner.url()
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.set_header(name, value);
    }

    fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.add_header(name, value);
    }

    fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.inner.set_timeouts(timeouts);
    }

    fn write_entity(&mut self, entity: HttpEntity) -> Result<(), ClientError> {
        let entity = entity.into_replayable();
        self.inner.write_entity(entity.clone())?;
        self.entity = Some(entity);
        Ok(())
    }

    async fn send(self) -> Result<HttpResource, ClientError> {
        self.send_signed().await.1
    }
}
