use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use crest_common::{Charset, DecodeError};
use smol_str::SmolStr;

use super::ReturnType;
use crate::entity::essence;

/// Turns a response body into a value of the declared return type.
pub trait Deserializer: fmt::Debug + Send + Sync {
    /// Whether this deserializer can produce `return_type` from a body of `content_type`.
    fn can_read(&self, return_type: &ReturnType, content_type: Option<&str>) -> bool;

    /// Decode `body`; `charset` applies to text formats.
    fn deserialize(
        &self,
        return_type: &ReturnType,
        body: &Bytes,
        charset: Charset,
    ) -> Result<Box<dyn Any + Send>, DecodeError>;
}

/// JSON through the return type's serde hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeserializer;

impl Deserializer for JsonDeserializer {
    fn can_read(&self, return_type: &ReturnType, _content_type: Option<&str>) -> bool {
        return_type.has_serde()
    }

    fn deserialize(
        &self,
        return_type: &ReturnType,
        body: &Bytes,
        charset: Charset,
    ) -> Result<Box<dyn Any + Send>, DecodeError> {
        return_type.decode_json(&charset.decode(body)?)
    }
}

/// XML through the return type's serde hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDeserializer;

impl Deserializer for XmlDeserializer {
    fn can_read(&self, return_type: &ReturnType, _content_type: Option<&str>) -> bool {
        return_type.has_serde()
    }

    fn deserialize(
        &self,
        return_type: &ReturnType,
        body: &Bytes,
        charset: Charset,
    ) -> Result<Box<dyn Any + Send>, DecodeError> {
        return_type.decode_xml(&charset.decode(body)?)
    }
}

type Reader =
    Arc<dyn Fn(&Bytes, Charset) -> Result<Box<dyn Any + Send>, DecodeError> + Send + Sync>;

/// Readers keyed by the exact return type, whatever the response content type.
#[derive(Clone)]
pub struct TypeRegistry {
    readers: HashMap<TypeId, Reader>,
}

impl TypeRegistry {
    /// Registry without readers.
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Read `T` with `read`, replacing any earlier reader for `T`.
    pub fn register<T, F>(mut self, read: F) -> Self
    where
        T: Any + Send,
        F: Fn(&Bytes, Charset) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        let reader: Reader = Arc::new(move |body: &Bytes, charset: Charset| {
            read(body, charset).map(|value| Box::new(value) as Box<dyn Any + Send>)
        });
        self.readers.insert(TypeId::of::<T>(), reader);
        self
    }

    /// Register `T` parsed from the trimmed body text.
    pub fn register_from_str<T>(self) -> Self
    where
        T: FromStr + Any + Send,
    {
        self.register::<T, _>(parse::<T>)
    }

    /// Whether a reader is registered for `return_type`.
    pub fn contains(&self, return_type: &ReturnType) -> bool {
        self.readers.contains_key(&return_type.id())
    }

    /// Read `body` as `return_type`, `None` when no reader is registered for it.
    pub fn read(
        &self,
        return_type: &ReturnType,
        body: &Bytes,
        charset: Charset,
    ) -> Option<Result<Box<dyn Any + Send>, DecodeError>> {
        self.readers
            .get(&return_type.id())
            .map(|read| read(body, charset))
    }
}

impl Default for TypeRegistry {
    /// Raw bytes, text, unit, booleans, numbers and RFC 3339 timestamps.
    fn default() -> Self {
        Self::empty()
            .register::<Bytes, _>(|body, _| Ok(body.clone()))
            .register::<Vec<u8>, _>(|body, _| Ok(body.to_vec()))
            .register::<String, _>(|body, charset| Ok(charset.decode(body)?.into_owned()))
            .register::<(), _>(|_, _| Ok(()))
            .register::<bool, _>(parse_bool)
            .register_from_str::<i8>()
            .register_from_str::<i16>()
            .register_from_str::<i32>()
            .register_from_str::<i64>()
            .register_from_str::<u8>()
            .register_from_str::<u16>()
            .register_from_str::<u32>()
            .register_from_str::<u64>()
            .register_from_str::<f32>()
            .register_from_str::<f64>()
            .register::<DateTime<FixedOffset>, _>(|body, charset| {
                let text = charset.decode(body)?;
                DateTime::parse_from_rfc3339(text.trim())
                    .map_err(|_| invalid::<DateTime<FixedOffset>>(&text))
            })
            .register::<DateTime<Utc>, _>(|body, charset| {
                let text = charset.decode(body)?;
                DateTime::parse_from_rfc3339(text.trim())
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|_| invalid::<DateTime<Utc>>(&text))
            })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.readers.len())
            .finish()
    }
}

fn invalid<T>(text: &str) -> DecodeError {
    DecodeError::InvalidValue {
        type_name: std::any::type_name::<T>(),
        text: text.trim().to_string(),
    }
}

fn parse<T: FromStr>(body: &Bytes, charset: Charset) -> Result<T, DecodeError> {
    let text = charset.decode(body)?;
    text.trim().parse::<T>().map_err(|_| invalid::<T>(&text))
}

fn parse_bool(body: &Bytes, charset: Charset) -> Result<bool, DecodeError> {
    let text = charset.decode(body)?;
    match text.trim() {
        t if t.eq_ignore_ascii_case("true") => Ok(true),
        t if t.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(invalid::<bool>(&text)),
    }
}

/// Deserializers keyed by response media type.
///
/// Lookups ignore parameters and fall back from `application/foo+json` to
/// `application/json` (likewise `+xml`).
#[derive(Debug, Clone)]
pub struct MimeRegistry {
    by_type: HashMap<SmolStr, Arc<dyn Deserializer>>,
}

impl MimeRegistry {
    /// Registry without deserializers.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Use `deserializer` for `media_type`, matched case-insensitively.
    pub fn register(mut self, media_type: &str, deserializer: Arc<dyn Deserializer>) -> Self {
        self.by_type.insert(essence(media_type).into(), deserializer);
        self
    }

    /// Deserializer for the essence of `content_type`, then for its `+json`/`+xml` suffix.
    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn Deserializer>> {
        let essence = essence(content_type);
        if let Some(deserializer) = self.by_type.get(essence.as_str()) {
            return Some(deserializer.clone());
        }
        let suffix = essence.rsplit_once('+').map(|(_, suffix)| suffix)?;
        self.by_type
            .get(format!("application/{suffix}").as_str())
            .cloned()
    }
}

impl Default for MimeRegistry {
    /// JSON and XML.
    fn default() -> Self {
        let json: Arc<dyn Deserializer> = Arc::new(JsonDeserializer);
        let xml: Arc<dyn Deserializer> = Arc::new(XmlDeserializer);
        Self::empty()
            .register("application/json", json.clone())
            .register("text/json", json)
            .register("application/xml", xml.clone())
            .register("text/xml", xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read<T: Any + Send>(registry: &TypeRegistry, body: &'static [u8]) -> Result<T, DecodeError> {
        registry
            .read(&ReturnType::of::<T>(), &Bytes::from_static(body), Charset::Utf8)
            .expect("registered")
            .map(|value| *value.downcast::<T>().unwrap())
    }

    #[test]
    fn builtin_types() {
        let registry = TypeRegistry::default();
        assert_eq!(read::<String>(&registry, b"hi").unwrap(), "hi");
        assert_eq!(read::<i32>(&registry, b" -42\n").unwrap(), -42);
        assert_eq!(read::<f64>(&registry, b"2.5").unwrap(), 2.5);
        assert!(read::<bool>(&registry, b"TRUE").unwrap());
        assert_eq!(read::<Vec<u8>>(&registry, b"\x00\x01").unwrap(), vec![0, 1]);
        read::<()>(&registry, b"ignored").unwrap();

        let at = read::<DateTime<Utc>>(&registry, b"2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }

    #[test]
    fn bad_text_names_the_type() {
        let err = read::<u8>(&TypeRegistry::default(), b"300").unwrap_err();
        match err {
            DecodeError::InvalidValue { type_name, text } => {
                assert_eq!(type_name, "u8");
                assert_eq!(text, "300");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_types_are_not_read() {
        assert!(
            TypeRegistry::default()
                .read(&ReturnType::of::<char>(), &Bytes::new(), Charset::Utf8)
                .is_none()
        );
    }

    #[test]
    fn mime_lookup_uses_suffix() {
        let registry = MimeRegistry::default();
        assert!(registry.lookup("application/hal+json; charset=utf-8").is_some());
        assert!(registry.lookup("application/atom+xml").is_some());
        assert!(registry.lookup("text/plain").is_none());
    }
}
