//! The parameter model: declared parameter configs, runtime values, and bound params.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use smol_str::SmolStr;

use crate::charset::Charset;
use crate::error::EncodeError;
use crate::serializer::{
    BooleanSerializer, BytesSerializer, DateSerializer, FileSerializer, JsonSerializer,
    ParamSerializer, ToStringSerializer,
};

/// Metadata key naming the file name reported for a multipart file part.
pub const META_FILE_NAME: &str = "file-name";
/// Metadata key giving an explicit content type for a multipart part.
pub const META_CONTENT_TYPE: &str = "content-type";
/// Metadata key selecting the multipart part kind.
pub const META_PART: &str = "part";
/// [`META_PART`] value forcing a parameter to be written as a file part.
pub const PART_FILE: &str = "file";

/// Where a parameter ends up in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    /// `?name=value` in the URL
    Query,
    /// Substituted into a `{name}` placeholder of the path template
    Path,
    /// Entity body field
    Form,
    /// Request header
    Header,
    /// Entry of the `Cookie` header
    Cookie,
    /// `;name=value` appended to the path
    Matrix,
}

impl Destination {
    /// All destinations, in request-assembly order.
    pub const ALL: [Destination; 6] = [
        Destination::Query,
        Destination::Path,
        Destination::Form,
        Destination::Header,
        Destination::Cookie,
        Destination::Matrix,
    ];

    /// Header and cookie values are never percent-encoded.
    pub const fn always_encoded(self) -> bool {
        matches!(self, Destination::Header | Destination::Cookie)
    }
}

/// Declared value type of a parameter, which picks its default serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    /// Text and numbers
    #[default]
    Text,
    /// `true`/`false`
    Boolean,
    /// Timestamps
    Date,
    /// Raw bytes (base64 outside multipart)
    Bytes,
    /// Filesystem path (contents outside multipart)
    File,
    /// Structured JSON value
    Json,
}

static TO_STRING: ToStringSerializer = ToStringSerializer;
static BOOLEAN: BooleanSerializer = BooleanSerializer::DEFAULT;
static DATE: DateSerializer = DateSerializer::RFC3339;
static BYTES: BytesSerializer = BytesSerializer;
static FILE: FileSerializer = FileSerializer;
static JSON: JsonSerializer = JsonSerializer;

impl ValueType {
    /// The serializer used when a parameter does not configure its own.
    pub fn default_serializer(self) -> &'static dyn ParamSerializer {
        match self {
            ValueType::Text => &TO_STRING,
            ValueType::Boolean => &BOOLEAN,
            ValueType::Date => &DATE,
            ValueType::Bytes => &BYTES,
            ValueType::File => &FILE,
            ValueType::Json => &JSON,
        }
    }
}

/// A runtime parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Text
    Text(String),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Bool(bool),
    /// UTC timestamp
    Date(DateTime<Utc>),
    /// Raw bytes
    Bytes(Bytes),
    /// Path to a file whose contents are sent
    File(PathBuf),
    /// Structured value
    Json(serde_json::Value),
}

impl ParamValue {
    /// Short name of the variant, for error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            ParamValue::Text(_) => "text",
            ParamValue::Int(_) => "integer",
            ParamValue::UInt(_) => "unsigned integer",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "boolean",
            ParamValue::Date(_) => "date",
            ParamValue::Bytes(_) => "bytes",
            ParamValue::File(_) => "file",
            ParamValue::Json(_) => "json",
        }
    }

    /// Whether multipart writes this value as a file part regardless of metadata.
    pub const fn is_binary(&self) -> bool {
        matches!(self, ParamValue::Bytes(_) | ParamValue::File(_))
    }
}

impl serde::Serialize for ParamValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        match self {
            ParamValue::Text(s) => serializer.serialize_str(s),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::UInt(u) => serializer.serialize_u64(*u),
            ParamValue::Float(f) => serializer.serialize_f64(*f),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::Date(d) => serializer.serialize_str(&d.to_rfc3339()),
            ParamValue::Bytes(b) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
            ParamValue::File(p) => serializer.collect_str(&p.display()),
            ParamValue::Json(v) => v.serialize(serializer),
        }
    }
}

macro_rules! from_value {
    ($($ty:ty => $variant:ident $(via $conv:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::$variant((v $(as $conv)?).into())
                }
            }
        )*
    };
}

from_value! {
    String => Text,
    &str => Text,
    &String => Text,
    SmolStr => Text,
    i8 => Int via i64,
    i16 => Int via i64,
    i32 => Int via i64,
    i64 => Int,
    u8 => UInt via u64,
    u16 => UInt via u64,
    u32 => UInt via u64,
    u64 => UInt,
    usize => UInt via u64,
    f32 => Float via f64,
    f64 => Float,
    bool => Bool,
    DateTime<Utc> => Date,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    &'static [u8] => Bytes,
    PathBuf => File,
    &Path => File,
    serde_json::Value => Json,
}

/// Static description of one method parameter.
///
/// Shared behind an `Arc` by every invocation of the method.
#[derive(Debug, Clone, bon::Builder)]
#[builder(start_fn = new)]
pub struct ParamConfig {
    /// Wire name
    #[builder(start_fn, into)]
    pub name: SmolStr,
    /// Where the parameter goes
    #[builder(start_fn)]
    pub destination: Destination,
    /// Declared value type
    #[builder(default)]
    pub value_type: ValueType,
    /// Used when the invocation supplies no value
    #[builder(into)]
    pub default_value: Option<ParamValue>,
    /// Overrides the value type's default serializer
    pub serializer: Option<Arc<dyn ParamSerializer>>,
    /// Values are already percent-encoded
    #[builder(default)]
    pub encoded: bool,
    /// `None` repeats the name per value, `Some(sep)` joins all values with `sep`
    #[builder(into)]
    pub list_separator: Option<SmolStr>,
    /// Free-form metadata, see [`META_FILE_NAME`], [`META_CONTENT_TYPE`], [`META_PART`]
    #[builder(default)]
    pub metadata: BTreeMap<SmolStr, SmolStr>,
}

impl ParamConfig {
    /// Metadata value for `key`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(SmolStr::as_str)
    }

    /// Whether multipart writers should emit this parameter as a file part.
    pub fn is_file_part(&self) -> bool {
        self.meta(META_PART) == Some(PART_FILE)
    }

    /// Serialize one value with the configured or default serializer.
    pub fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError> {
        match &self.serializer {
            Some(serializer) => serializer.serialize(value, charset),
            None => self.value_type.default_serializer().serialize(value, charset),
        }
    }
}

/// A parameter config bound to the values of one invocation.
#[derive(Debug, Clone)]
pub struct Param {
    config: Arc<ParamConfig>,
    values: Vec<ParamValue>,
}

impl Param {
    /// Bind values as given, without applying the default.
    pub fn new(config: Arc<ParamConfig>, values: Vec<ParamValue>) -> Self {
        Self { config, values }
    }

    /// Bind invocation values, falling back to the configured default.
    ///
    /// Returns `None` when there is neither a value nor a default, in which case the
    /// parameter is left out of the request entirely.
    pub fn bind(config: Arc<ParamConfig>, values: Vec<ParamValue>) -> Option<Self> {
        if !values.is_empty() {
            return Some(Self { config, values });
        }
        let default = config.default_value.clone()?;
        Some(Self {
            config,
            values: vec![default],
        })
    }

    /// Wire name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Destination.
    pub fn destination(&self) -> Destination {
        self.config.destination
    }

    /// The shared config.
    pub fn config(&self) -> &Arc<ParamConfig> {
        &self.config
    }

    /// Bound values, in invocation order.
    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }
}

/// A wire-ready name/value pair produced by the param encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPair {
    /// Parameter name
    pub name: SmolStr,
    /// Serialized value
    pub value: String,
    /// Value must not be percent-encoded again
    pub encoded: bool,
}

impl EncodedPair {
    /// Create a pair.
    pub fn new(name: impl Into<SmolStr>, value: impl Into<String>, encoded: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            encoded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_applies_default() {
        let config = Arc::new(
            ParamConfig::new("page", Destination::Query)
                .default_value(1)
                .build(),
        );
        let bound = Param::bind(config.clone(), vec![]).unwrap();
        assert_eq!(bound.values(), &[ParamValue::Int(1)]);

        let bound = Param::bind(config, vec![ParamValue::from(7)]).unwrap();
        assert_eq!(bound.values(), &[ParamValue::Int(7)]);
    }

    #[test]
    fn bind_drops_missing_without_default() {
        let config = Arc::new(ParamConfig::new("q", Destination::Query).build());
        assert!(Param::bind(config, vec![]).is_none());
    }

    #[test]
    fn file_part_metadata() {
        let config = ParamConfig::new("upload", Destination::Form)
            .metadata(BTreeMap::from([(
                SmolStr::new_static(META_PART),
                SmolStr::new_static(PART_FILE),
            )]))
            .build();
        assert!(config.is_file_part());
        assert_eq!(config.meta(META_FILE_NAME), None);
    }

    #[test]
    fn values_serialize_as_json() {
        let v = serde_json::to_value([ParamValue::from("a"), ParamValue::from(2u8)]).unwrap();
        assert_eq!(v, serde_json::json!(["a", 2]));
    }
}
