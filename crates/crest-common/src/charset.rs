//! Character sets used for parameter values, bodies and responses.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, EncodeError};

/// The character sets crest can transcode between.
///
/// Rust strings are UTF-8, so [`Charset::Utf8`] is always a no-op. The single-byte sets
/// transcode per character and reject anything they cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    /// UTF-8
    #[default]
    Utf8,
    /// ISO-8859-1
    Latin1,
    /// US-ASCII
    Ascii,
}

impl Charset {
    /// Canonical name, as used in `charset=` media type parameters.
    pub const fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }

    fn max_code_point(self) -> u32 {
        match self {
            Charset::Utf8 => char::MAX as u32,
            Charset::Latin1 => 0xFF,
            Charset::Ascii => 0x7F,
        }
    }

    /// Encode text into bytes of this charset.
    pub fn encode(self, text: &str) -> Result<Cow<'_, [u8]>, EncodeError> {
        if self == Charset::Utf8 || text.is_ascii() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        let max = self.max_code_point();
        text.chars()
            .map(|ch| {
                let cp = ch as u32;
                if cp <= max {
                    Ok(cp as u8)
                } else {
                    Err(EncodeError::Unmappable {
                        ch,
                        charset: self.name(),
                    })
                }
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Cow::Owned)
    }

    /// Decode bytes of this charset into text.
    pub fn decode(self, bytes: &[u8]) -> Result<Cow<'_, str>, DecodeError> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| DecodeError::Charset {
                    charset: self.name(),
                }),
            Charset::Ascii if !bytes.is_ascii() => Err(DecodeError::Charset {
                charset: self.name(),
            }),
            Charset::Ascii => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| DecodeError::Charset {
                    charset: self.name(),
                }),
            Charset::Latin1 => Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognized charset label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("unsupported charset `{0}`")]
#[diagnostic(code(crest::charset::unsupported))]
pub struct UnsupportedCharset(pub String);

impl FromStr for Charset {
    type Err = UnsupportedCharset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Ok(Charset::Latin1),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            _ => Err(UnsupportedCharset(s.to_string())),
        }
    }
}

impl serde::Serialize for Charset {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> serde::Deserialize<'de> for Charset {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
