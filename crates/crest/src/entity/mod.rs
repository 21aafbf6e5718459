//! Request entity (body) writers.

use std::fmt::Debug;
use std::io::Write;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use crest_common::EncodeError;

use crate::request::Request;

mod multipart;
mod serializer;
mod url_encoded;

pub use multipart::MultipartEntityWriter;
pub use serializer::{
    BodySerializer, BodySerializers, FormFields, JsonBodySerializer, SerializerEntityWriter,
    XmlBodySerializer,
};
pub use url_encoded::UrlEncodedEntityWriter;

/// Serializes the FORM parameters of a request into an HTTP entity.
pub trait EntityWriter: Debug + Send + Sync {
    /// Full `Content-Type` value, parameters included.
    fn content_type(&self, request: &Request) -> String;

    /// Body length in bytes, `None` when it cannot be known up front.
    fn content_length(&self, request: &Request) -> Result<Option<u64>, EncodeError>;

    /// Write the body.
    fn write_to(&self, request: &Request, out: &mut dyn Write) -> Result<(), EncodeError>;

    /// Whether writing twice is cheap and yields identical bytes.
    fn is_replayable(&self) -> bool {
        false
    }
}

/// Media type without parameters, lowercased.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Renders the inner writer once, then replays the bytes.
///
/// Scoped to a single request: the cache ignores which request later calls pass in.
#[derive(Debug)]
pub struct CachingEntityWriter {
    inner: Arc<dyn EntityWriter>,
    content_type: OnceLock<String>,
    body: OnceLock<Bytes>,
}

impl CachingEntityWriter {
    /// Cache whatever `inner` renders.
    pub fn new(inner: Arc<dyn EntityWriter>) -> Self {
        Self {
            inner,
            content_type: OnceLock::new(),
            body: OnceLock::new(),
        }
    }

    /// The rendered body.
    pub fn bytes(&self, request: &Request) -> Result<Bytes, EncodeError> {
        if let Some(body) = self.body.get() {
            return Ok(body.clone());
        }
        let mut buf = Vec::new();
        self.inner.write_to(request, &mut buf)?;
        Ok(self.body.get_or_init(|| Bytes::from(buf)).clone())
    }
}

impl EntityWriter for CachingEntityWriter {
    fn content_type(&self, request: &Request) -> String {
        self.content_type
            .get_or_init(|| self.inner.content_type(request))
            .clone()
    }

    fn content_length(&self, request: &Request) -> Result<Option<u64>, EncodeError> {
        Ok(Some(self.bytes(request)?.len() as u64))
    }

    fn write_to(&self, request: &Request, out: &mut dyn Write) -> Result<(), EncodeError> {
        out.write_all(&self.bytes(request)?)?;
        Ok(())
    }

    fn is_replayable(&self) -> bool {
        true
    }
}

/// A writer paired with the request it writes.
#[derive(Debug, Clone)]
pub struct HttpEntity {
    writer: Arc<dyn EntityWriter>,
    request: Arc<Request>,
}

impl HttpEntity {
    /// `writer` bound to `request`.
    pub fn new(writer: Arc<dyn EntityWriter>, request: Arc<Request>) -> Self {
        Self { writer, request }
    }

    /// Same entity, rendered at most once from here on.
    pub fn into_replayable(self) -> Self {
        if self.writer.is_replayable() {
            return self;
        }
        Self {
            writer: Arc::new(CachingEntityWriter::new(self.writer)),
            request: self.request,
        }
    }

    /// Full `Content-Type` value.
    pub fn content_type(&self) -> String {
        self.writer.content_type(&self.request)
    }

    /// Body length, `None` when unknown up front.
    pub fn content_length(&self) -> Result<Option<u64>, EncodeError> {
        self.writer.content_length(&self.request)
    }

    /// Write the body to `out`.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<(), EncodeError> {
        self.writer.write_to(&self.request, out)
    }

    /// The whole body in memory.
    pub fn to_bytes(&self) -> Result<Bytes, EncodeError> {
        let mut buf = Vec::with_capacity(self.content_length()?.unwrap_or(0) as usize);
        self.write_to(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::MethodConfig;
    use crate::request::Args;

    #[derive(Debug, Default)]
    struct CountingWriter {
        writes: AtomicUsize,
    }

    impl EntityWriter for CountingWriter {
        fn content_type(&self, _request: &Request) -> String {
            "text/plain".into()
        }

        fn content_length(&self, _request: &Request) -> Result<Option<u64>, EncodeError> {
            Ok(None)
        }

        fn write_to(&self, _request: &Request, out: &mut dyn Write) -> Result<(), EncodeError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            out.write_all(b"payload")?;
            Ok(())
        }
    }

    #[test]
    fn caching_writer_renders_once() {
        let config = Arc::new(
            MethodConfig::builder(
                http::Method::POST,
                url::Url::parse("https://example.com").unwrap(),
                "/",
            )
            .build()
            .unwrap(),
        );
        let request = Arc::new(Request::bind(&config, Args::new()).unwrap());
        let inner = Arc::new(CountingWriter::default());
        let entity = HttpEntity::new(inner.clone(), request).into_replayable();

        assert_eq!(entity.content_length().unwrap(), Some(7));
        assert_eq!(entity.to_bytes().unwrap().as_ref(), b"payload");
        assert_eq!(entity.to_bytes().unwrap().as_ref(), b"payload");
        assert_eq!(inner.writes.load(Ordering::SeqCst), 1);

        let again = entity.clone().into_replayable();
        assert_eq!(again.to_bytes().unwrap().as_ref(), b"payload");
        assert_eq!(inner.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn essence_strips_parameters() {
        assert_eq!(essence("Application/JSON; charset=UTF-8"), "application/json");
        assert_eq!(essence("text/xml"), "text/xml");
    }
}
