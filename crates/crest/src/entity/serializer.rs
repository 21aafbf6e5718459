use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;

use crest_common::param::{Destination, ParamValue};
use crest_common::{Charset, EncodeError};
use serde::ser::{SerializeMap, Serializer};
use smol_str::SmolStr;

use super::{EntityWriter, essence};
use crate::request::Request;

/// FORM parameters as an ordered name → value map.
///
/// A parameter with one value serializes as that value, one with several as an array.
/// Repeated names merge into one entry at the position of their first occurrence.
#[derive(Debug, Default)]
pub struct FormFields<'r> {
    fields: Vec<(&'r str, Vec<&'r ParamValue>)>,
}

impl<'r> FormFields<'r> {
    /// Collect the FORM parameters of `request`.
    pub fn of(request: &'r Request) -> Self {
        let mut fields: Vec<(&'r str, Vec<&'r ParamValue>)> = Vec::new();
        for param in request.params(Destination::Form) {
            let values = param.values().iter();
            match fields.iter_mut().find(|(name, _)| *name == param.name()) {
                Some((_, existing)) => existing.extend(values),
                None => fields.push((param.name(), values.collect())),
            }
        }
        Self { fields }
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no FORM parameters are bound.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl serde::Serialize for FormFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, values) in &self.fields {
            match values.as_slice() {
                [single] => map.serialize_entry(name, single)?,
                many => map.serialize_entry(name, many)?,
            }
        }
        map.end()
    }
}

/// Writes form fields in one media type.
pub trait BodySerializer: Debug + Send + Sync {
    /// Serialize `fields` as the body.
    fn serialize(
        &self,
        fields: &FormFields<'_>,
        charset: Charset,
        out: &mut dyn Write,
    ) -> Result<(), EncodeError>;
}

/// Compact JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodySerializer;

impl BodySerializer for JsonBodySerializer {
    fn serialize(
        &self,
        fields: &FormFields<'_>,
        charset: Charset,
        out: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        let json = serde_json::to_string(fields)?;
        out.write_all(&charset.encode(&json)?)?;
        Ok(())
    }
}

/// One element per field below a root element.
#[derive(Debug, Clone)]
pub struct XmlBodySerializer {
    root: SmolStr,
}

impl XmlBodySerializer {
    /// Wrap fields in a `root` element.
    pub fn new(root: impl Into<SmolStr>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for XmlBodySerializer {
    fn default() -> Self {
        Self::new("request")
    }
}

impl BodySerializer for XmlBodySerializer {
    fn serialize(
        &self,
        fields: &FormFields<'_>,
        charset: Charset,
        out: &mut dyn Write,
    ) -> Result<(), EncodeError> {
        let xml = quick_xml::se::to_string_with_root(&self.root, fields)?;
        write!(out, "<?xml version=\"1.0\" encoding=\"{charset}\"?>")?;
        out.write_all(&charset.encode(&xml)?)?;
        Ok(())
    }
}

/// Body serializers by media type.
///
/// Lookups ignore media type parameters and fall back from `application/foo+json` to
/// `application/json` (likewise `+xml`).
#[derive(Debug, Clone)]
pub struct BodySerializers {
    by_type: HashMap<SmolStr, Arc<dyn BodySerializer>>,
}

impl BodySerializers {
    /// No serializers at all.
    pub fn empty() -> Self {
        Self {
            by_type: HashMap::new(),
        }
    }

    /// Use `serializer` for `media_type`.
    pub fn register(mut self, media_type: &str, serializer: Arc<dyn BodySerializer>) -> Self {
        self.by_type.insert(essence(media_type).into(), serializer);
        self
    }

    /// Serializer for the essence of `content_type`, then for its `+json`/`+xml` suffix.
    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn BodySerializer>> {
        let essence = essence(content_type);
        if let Some(serializer) = self.by_type.get(essence.as_str()) {
            return Some(serializer.clone());
        }
        let suffix = essence.rsplit_once('+').map(|(_, suffix)| suffix)?;
        self.by_type
            .get(format!("application/{suffix}").as_str())
            .cloned()
    }
}

impl Default for BodySerializers {
    /// JSON and XML.
    fn default() -> Self {
        let xml: Arc<dyn BodySerializer> = Arc::new(XmlBodySerializer::default());
        Self::empty()
            .register("application/json", Arc::new(JsonBodySerializer))
            .register("application/xml", xml.clone())
            .register("text/xml", xml)
    }
}

/// Delegates the body to the [`BodySerializer`] registered for a media type.
#[derive(Debug, Clone)]
pub struct SerializerEntityWriter {
    content_type: SmolStr,
    serializer: Arc<dyn BodySerializer>,
}

impl SerializerEntityWriter {
    /// Writer for `content_type` bodies produced by `serializer`.
    pub fn new(content_type: impl Into<SmolStr>, serializer: Arc<dyn BodySerializer>) -> Self {
        Self {
            content_type: content_type.into(),
            serializer,
        }
    }
}

impl EntityWriter for SerializerEntityWriter {
    fn content_type(&self, request: &Request) -> String {
        if self.content_type.to_ascii_lowercase().contains("charset=") {
            self.content_type.to_string()
        } else {
            format!("{}; charset={}", self.content_type, request.charset())
        }
    }

    fn content_length(&self, _request: &Request) -> Result<Option<u64>, EncodeError> {
        Ok(None)
    }

    fn write_to(&self, request: &Request, out: &mut dyn Write) -> Result<(), EncodeError> {
        self.serializer
            .serialize(&FormFields::of(request), request.charset(), out)
    }
}
