use std::any::{Any, TypeId};
use std::fmt;

use crest_common::DecodeError;
use serde::de::DeserializeOwned;

type Decoded = Result<Box<dyn Any + Send>, DecodeError>;

/// The declared result type of a method, erased.
///
/// [`of`](Self::of) is enough for types the type registry knows (bytes, text, numbers,
/// dates) and for [`EntityStream`](crate::response::EntityStream).
/// [`serde`](Self::serde) additionally carries JSON and XML decoders for `T`, which is
/// what the structured-format deserializers need.
#[derive(Clone, Copy)]
pub struct ReturnType {
    id: TypeId,
    name: &'static str,
    json: Option<fn(&str) -> Decoded>,
    xml: Option<fn(&str) -> Decoded>,
}

impl ReturnType {
    /// `T` without serde hooks: only registered readers can produce it.
    pub fn of<T: Any + Send>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            json: None,
            xml: None,
        }
    }

    /// A type decodable from JSON and XML through serde.
    pub fn serde<T: DeserializeOwned + Any + Send>() -> Self {
        Self {
            json: Some(from_json::<T>),
            xml: Some(from_xml::<T>),
            ..Self::of::<T>()
        }
    }

    /// `TypeId` of the declared type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Whether JSON and XML decoding hooks are available.
    pub fn has_serde(&self) -> bool {
        self.json.is_some()
    }

    /// Decode JSON `text`.
    pub fn decode_json(&self, text: &str) -> Decoded {
        let decode = self.json.ok_or(DecodeError::Unsupported {
            type_name: self.name,
            format: "JSON",
        })?;
        decode(text)
    }

    /// Decode XML `text`.
    pub fn decode_xml(&self, text: &str) -> Decoded {
        let decode = self.xml.ok_or(DecodeError::Unsupported {
            type_name: self.name,
            format: "XML",
        })?;
        decode(text)
    }
}

impl fmt::Debug for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnType")
            .field("name", &self.name)
            .field("serde", &self.has_serde())
            .finish()
    }
}

impl PartialEq for ReturnType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReturnType {}

fn from_json<T: DeserializeOwned + Any + Send>(text: &str) -> Decoded {
    Ok(Box::new(serde_json::from_str::<T>(text)?))
}

fn from_xml<T: DeserializeOwned + Any + Send>(text: &str) -> Decoded {
    Ok(Box::new(quick_xml::de::from_str::<T>(text)?))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn identity_ignores_hooks() {
        assert_eq!(ReturnType::of::<Item>(), ReturnType::serde::<Item>());
        assert!(ReturnType::of::<String>().is::<String>());
        assert!(!ReturnType::of::<String>().is::<&'static str>());
    }

    #[test]
    fn serde_types_decode_json_and_xml() {
        let rt = ReturnType::serde::<Item>();
        let json = rt.decode_json(r#"{"id":7,"name":"bolt"}"#).unwrap();
        assert_eq!(
            *json.downcast::<Item>().unwrap(),
            Item {
                id: 7,
                name: "bolt".into()
            }
        );
        let xml = rt
            .decode_xml("<item><id>8</id><name>nut</name></item>")
            .unwrap();
        assert_eq!(xml.downcast::<Item>().unwrap().id, 8);
    }

    #[test]
    fn plain_types_reject_structured_formats() {
        let err = ReturnType::of::<Item>().decode_json("{}").unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { format: "JSON", .. }));
    }
}
