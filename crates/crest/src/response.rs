use std::io::{BufRead, Cursor, Read};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use crest_common::{Charset, DecodeError};
use http::{HeaderMap, StatusCode};
use smol_str::SmolStr;

use crate::channel::HttpResource;
use crate::dispatch::ReturnType;
use crate::entity::essence;
use crate::request::Request;

/// A successful (status < 400) response, not yet dispatched.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<SmolStr>,
    charset: Charset,
    request: Arc<Request>,
    entity: Option<Bytes>,
}

impl Response {
    pub(crate) fn new(resource: HttpResource, request: Arc<Request>) -> Self {
        let content_type = resource.content_type().map(|ct| SmolStr::from(essence(ct)));
        let charset = resource
            .content_type()
            .and_then(charset_param)
            .unwrap_or_else(|| request.charset());
        let (status, headers, body) = resource.into_parts();
        Self {
            status,
            headers,
            content_type,
            charset,
            request,
            entity: Some(body),
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers, content encoding already removed.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Charset named by the response, else the request charset.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// The request this answers.
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// The type the method declares as its result.
    pub fn return_type(&self) -> &ReturnType {
        self.request.config().return_type()
    }

    /// Take ownership of the body. Only the first call succeeds.
    pub fn take_entity(&mut self) -> Result<Bytes, DecodeError> {
        self.entity.take().ok_or(DecodeError::EntityConsumed)
    }

    /// Hand the body over as a reader.
    pub fn entity_stream(&mut self) -> Result<EntityStream, DecodeError> {
        self.take_entity().map(EntityStream::new)
    }
}

fn charset_param(content_type: &str) -> Option<Charset> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Charset::from_str(value.trim()).ok())
}

/// Response body handed to the caller undecoded.
///
/// Declare it with `ReturnType::of::<EntityStream>()`.
#[derive(Debug, Clone)]
pub struct EntityStream {
    inner: Cursor<Bytes>,
}

impl EntityStream {
    /// Stream over `body`.
    pub fn new(body: Bytes) -> Self {
        Self {
            inner: Cursor::new(body),
        }
    }

    /// Everything not yet read.
    pub fn into_bytes(self) -> Bytes {
        let position = (self.inner.position() as usize).min(self.inner.get_ref().len());
        self.inner.into_inner().slice(position..)
    }
}

impl Read for EntityStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for EntityStream {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}
