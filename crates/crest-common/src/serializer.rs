//! Per-parameter value serializers.
//!
//! A [`ParamSerializer`] turns one [`ParamValue`] into the text that goes on the wire,
//! before any percent-encoding. Serializers are pure and shared between invocations.

use std::fmt::Debug;

use base64::Engine;
use smol_str::SmolStr;

use crate::charset::Charset;
use crate::error::EncodeError;
use crate::param::ParamValue;

/// Converts a parameter value into its textual wire form.
pub trait ParamSerializer: Debug + Send + Sync {
    /// Serialize `value`; `charset` is the request charset.
    fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError>;
}

/// `Display`-style rendering for text and numbers.
///
/// Dates render as RFC 3339 and structured values as compact JSON. Bytes and files have no
/// textual form here and are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringSerializer;

impl ParamSerializer for ToStringSerializer {
    fn serialize(&self, value: &ParamValue, _charset: Charset) -> Result<String, EncodeError> {
        Ok(match value {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::UInt(u) => u.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Date(d) => d.to_rfc3339(),
            ParamValue::Json(v) => serde_json::to_string(v)?,
            ParamValue::Bytes(_) | ParamValue::File(_) => {
                return Err(EncodeError::Unsupported {
                    serializer: "to-string",
                    value: value.kind(),
                });
            }
        })
    }
}

/// Booleans with configurable spellings.
#[derive(Debug, Clone)]
pub struct BooleanSerializer {
    true_value: SmolStr,
    false_value: SmolStr,
}

impl BooleanSerializer {
    /// `true` / `false`
    pub const DEFAULT: Self = Self {
        true_value: SmolStr::new_static("true"),
        false_value: SmolStr::new_static("false"),
    };

    /// Custom spellings, e.g. `1`/`0` or `yes`/`no`.
    pub fn new(true_value: impl Into<SmolStr>, false_value: impl Into<SmolStr>) -> Self {
        Self {
            true_value: true_value.into(),
            false_value: false_value.into(),
        }
    }
}

impl Default for BooleanSerializer {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ParamSerializer for BooleanSerializer {
    fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError> {
        match value {
            ParamValue::Bool(true) => Ok(self.true_value.to_string()),
            ParamValue::Bool(false) => Ok(self.false_value.to_string()),
            other => ToStringSerializer.serialize(other, charset),
        }
    }
}

/// Timestamps rendered with a chrono format string.
#[derive(Debug, Clone)]
pub struct DateSerializer {
    format: Option<SmolStr>,
}

impl DateSerializer {
    /// RFC 3339 (`2024-01-02T03:04:05+00:00`)
    pub const RFC3339: Self = Self { format: None };

    /// A chrono `strftime` format, e.g. `%Y-%m-%d`.
    pub fn with_format(format: impl Into<SmolStr>) -> Self {
        Self {
            format: Some(format.into()),
        }
    }
}

impl Default for DateSerializer {
    fn default() -> Self {
        Self::RFC3339
    }
}

impl ParamSerializer for DateSerializer {
    fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError> {
        match (value, &self.format) {
            (ParamValue::Date(d), Some(format)) => Ok(d.format(format.as_str()).to_string()),
            (ParamValue::Date(d), None) => Ok(d.to_rfc3339()),
            (ParamValue::Int(secs), _) => chrono::DateTime::from_timestamp(*secs, 0)
                .ok_or(EncodeError::Unsupported {
                    serializer: "date",
                    value: "out-of-range timestamp",
                })
                .and_then(|d| self.serialize(&ParamValue::Date(d), charset)),
            other => ToStringSerializer.serialize(other.0, charset),
        }
    }
}

/// Raw bytes as standard base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl ParamSerializer for BytesSerializer {
    fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError> {
        let engine = &base64::engine::general_purpose::STANDARD;
        match value {
            ParamValue::Bytes(b) => Ok(engine.encode(b)),
            ParamValue::Text(s) => Ok(engine.encode(charset.encode(s)?)),
            other => ToStringSerializer.serialize(other, charset),
        }
    }
}

/// A file's contents, decoded as text in the request charset.
///
/// Reads the file with blocking I/O while the request is being built. Keep file-valued
/// query, path and header parameters small, or pass them as FORM parameters: entity
/// bodies are rendered on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSerializer;

impl ParamSerializer for FileSerializer {
    fn serialize(&self, value: &ParamValue, charset: Charset) -> Result<String, EncodeError> {
        match value {
            ParamValue::File(path) => {
                let bytes = std::fs::read(path)?;
                charset
                    .decode(&bytes)
                    .map(|text| text.into_owned())
                    .map_err(|_| {
                        EncodeError::Io(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("{} is not valid {}", path.display(), charset),
                        ))
                    })
            }
            ParamValue::Bytes(bytes) => charset
                .decode(bytes)
                .map(|text| text.into_owned())
                .map_err(|_| EncodeError::Unsupported {
                    serializer: "file",
                    value: "non-text bytes",
                }),
            other => ToStringSerializer.serialize(other, charset),
        }
    }
}

/// Compact JSON for any value.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ParamSerializer for JsonSerializer {
    fn serialize(&self, value: &ParamValue, _charset: Charset) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn booleans_use_configured_spelling() {
        let s = BooleanSerializer::new("1", "0");
        assert_eq!(s.serialize(&true.into(), Charset::Utf8).unwrap(), "1");
        assert_eq!(s.serialize(&false.into(), Charset::Utf8).unwrap(), "0");
        assert_eq!(
            BooleanSerializer::DEFAULT
                .serialize(&true.into(), Charset::Utf8)
                .unwrap(),
            "true"
        );
    }

    #[test]
    fn dates_default_to_rfc3339() {
        let d = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            DateSerializer::RFC3339
                .serialize(&d.into(), Charset::Utf8)
                .unwrap(),
            "2024-01-02T03:04:05+00:00"
        );
        assert_eq!(
            DateSerializer::with_format("%Y-%m-%d")
                .serialize(&d.into(), Charset::Utf8)
                .unwrap(),
            "2024-01-02"
        );
    }

    #[test]
    fn bytes_are_base64() {
        let out = BytesSerializer
            .serialize(&ParamValue::from(b"hi".to_vec()), Charset::Utf8)
            .unwrap();
        assert_eq!(out, "aGk=");
    }

    #[test]
    fn to_string_rejects_binary() {
        assert!(
            ToStringSerializer
                .serialize(&ParamValue::from(vec![1u8]), Charset::Utf8)
                .is_err()
        );
    }

    #[test]
    fn json_is_compact() {
        let v = ParamValue::from(serde_json::json!({"a": [1, 2]}));
        assert_eq!(
            JsonSerializer.serialize(&v, Charset::Utf8).unwrap(),
            r#"{"a":[1,2]}"#
        );
    }

    #[test]
    fn file_contents_are_read() {
        let path = std::env::temp_dir().join("crest-file-serializer-test.txt");
        std::fs::write(&path, "hello").unwrap();
        let out = FileSerializer
            .serialize(&ParamValue::from(path.clone()), Charset::Utf8)
            .unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(out, "hello");
    }
}
