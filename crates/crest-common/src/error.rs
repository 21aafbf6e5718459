//! Error types for crest client operations

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use smol_str::SmolStr;
use url::Url;

/// Client error type wrapping all possible error conditions
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// Method configuration is unusable (never retried)
    #[error("Configuration error: {0}")]
    Configuration(
        #[from]
        #[diagnostic_source]
        ConfigError,
    ),

    /// An invocation argument was rejected (never retried)
    #[error("Invalid argument: {0}")]
    Argument(
        #[from]
        #[diagnostic_source]
        ArgumentError,
    ),

    /// HTTP transport error
    #[error("HTTP transport error: {0}")]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// HTTP error response (status >= 400)
    #[error("HTTP {0}")]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),

    /// Request serialization failed
    #[error("{0}")]
    Encode(
        #[from]
        #[diagnostic_source]
        EncodeError,
    ),

    /// Response deserialization failed
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Auth(
        #[from]
        #[diagnostic_source]
        AuthError,
    ),
}

impl ClientError {
    /// Whether a retry handler gets to look at this error.
    ///
    /// Only failures that may be transient are offered to a retry policy: anything that
    /// happened before a status line was read, and application errors (status >= 400).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_))
    }

    /// HTTP status of an application error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Invalid or incomplete method configuration
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    /// Template could not be tokenized
    #[error("invalid path template `{template}`: {reason}")]
    #[diagnostic(code(crest::path::invalid_template))]
    InvalidTemplate {
        /// The offending template
        template: SmolStr,
        /// What went wrong
        reason: SmolStr,
    },

    /// A placeholder pattern is not a valid regular expression
    #[error("invalid pattern for placeholder `{name}`")]
    #[diagnostic(code(crest::path::invalid_pattern))]
    InvalidPattern {
        /// Placeholder name
        name: SmolStr,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },

    /// A path value was supplied for a placeholder the template does not declare
    #[error("unknown placeholder `{name}` in `{template}`")]
    #[diagnostic(
        code(crest::path::unknown_placeholder),
        help("check the PATH parameter names against the method's path template")
    )]
    UnknownPlaceholder {
        /// Placeholder name
        name: SmolStr,
        /// Template being resolved
        template: SmolStr,
    },

    /// The same placeholder was merged twice
    #[error("placeholder `{name}` was already merged")]
    #[diagnostic(
        code(crest::path::already_merged),
        help("multi-valued PATH parameters need a list separator")
    )]
    PlaceholderAlreadyMerged {
        /// Placeholder name
        name: SmolStr,
    },

    /// The template still has placeholders without values
    #[error("unresolved placeholders {names:?} in `{template}`")]
    #[diagnostic(code(crest::path::unresolved))]
    UnresolvedPlaceholders {
        /// Missing names
        names: Vec<SmolStr>,
        /// Template being resolved
        template: SmolStr,
    },

    /// Endpoint or resolved URL failed to parse
    #[error("invalid url: {0}")]
    #[diagnostic(code(crest::config::url))]
    InvalidUrl(#[from] url::ParseError),

    /// No body serializer is registered for the declared content type
    #[error("no body serializer registered for `{content_type}`")]
    #[diagnostic(code(crest::entity::no_serializer))]
    NoBodySerializer {
        /// Declared content type
        content_type: SmolStr,
    },

    /// Nothing can turn the response into the declared return type
    #[error("no deserializer for `{type_name}` (content type {content_type:?})")]
    #[diagnostic(
        code(crest::dispatch::no_deserializer),
        help("register a deserializer for the return type or its mime type")
    )]
    NoDeserializer {
        /// Declared return type
        type_name: &'static str,
        /// Response content type, if any
        content_type: Option<SmolStr>,
    },

    /// The caller asked for a different type than the method declares
    #[error("method returns `{declared}`, caller expected `{expected}`")]
    #[diagnostic(code(crest::dispatch::return_type))]
    ReturnTypeMismatch {
        /// Type declared by the method config
        declared: &'static str,
        /// Type the caller asked for
        expected: &'static str,
    },
}

/// An invocation argument that cannot be used as given
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ArgumentError {
    /// A PATH value does not match its placeholder pattern
    #[error("value `{value}` for `{name}` does not match `{pattern}`")]
    #[diagnostic(code(crest::path::invalid_value))]
    InvalidPathValue {
        /// Placeholder name
        name: SmolStr,
        /// Rejected value
        value: String,
        /// Placeholder pattern
        pattern: SmolStr,
    },

    /// Argument count differs from the declared parameter count
    #[error("expected {expected} arguments, got {actual}")]
    #[diagnostic(code(crest::request::arity))]
    ArityMismatch {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// A header name or value is not valid HTTP
    #[error("invalid header `{name}`: {reason}")]
    #[diagnostic(code(crest::request::header))]
    InvalidHeader {
        /// Header name
        name: SmolStr,
        /// What went wrong
        reason: String,
    },
}

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Failed to establish connection to server
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<std::convert::Infallible> for TransportError {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}

/// Request serialization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EncodeError {
    /// A character cannot be represented in the target charset
    #[error("`{ch}` cannot be encoded as {charset}")]
    #[diagnostic(code(crest::encode::unmappable))]
    Unmappable {
        /// Offending character
        ch: char,
        /// Charset name
        charset: &'static str,
    },

    /// The serializer does not handle this kind of value
    #[error("{serializer} cannot serialize {value}")]
    #[diagnostic(code(crest::encode::unsupported))]
    Unsupported {
        /// Serializer name
        serializer: &'static str,
        /// Value kind
        value: &'static str,
    },

    /// Reading a file or writing the body failed
    #[error("I/O error while writing request: {0}")]
    #[diagnostic(code(crest::encode::io))]
    Io(
        #[from]
        #[source]
        std::io::Error,
    ),

    /// Failed to serialize JSON body
    #[error("Failed to serialize JSON: {0}")]
    #[diagnostic(code(crest::encode::json))]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),

    /// Failed to serialize XML body
    #[error("Failed to serialize XML: {0}")]
    #[diagnostic(code(crest::encode::xml))]
    Xml(
        #[from]
        #[source]
        quick_xml::SeError,
    ),

    /// Failed to serialize form data
    #[error("Failed to serialize form: {0}")]
    #[diagnostic(code(crest::encode::form))]
    Form(
        #[from]
        #[source]
        serde_html_form::ser::Error,
    ),
}

/// Response deserialization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecodeError {
    /// JSON deserialization failed
    #[error("Failed to deserialize JSON: {0}")]
    #[diagnostic(code(crest::decode::json))]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),

    /// XML deserialization failed
    #[error("Failed to deserialize XML: {0}")]
    #[diagnostic(code(crest::decode::xml))]
    Xml(
        #[from]
        #[source]
        quick_xml::DeError,
    ),

    /// Form deserialization failed
    #[error("Failed to deserialize form: {0}")]
    #[diagnostic(code(crest::decode::form))]
    Form(
        #[from]
        #[source]
        serde_html_form::de::Error,
    ),

    /// Body bytes are not valid in the response charset
    #[error("response body is not valid {charset}")]
    #[diagnostic(code(crest::decode::charset))]
    Charset {
        /// Charset name
        charset: &'static str,
    },

    /// Content-encoding could not be decoded
    #[error("failed to decode `{encoding}` content: {source}")]
    #[diagnostic(code(crest::decode::content_encoding))]
    ContentEncoding {
        /// Content-encoding token
        encoding: SmolStr,
        /// Decoder error
        #[source]
        source: std::io::Error,
    },

    /// Body text is not a valid value of the target type
    #[error("cannot read `{text}` as {type_name}")]
    #[diagnostic(code(crest::decode::value))]
    InvalidValue {
        /// Target type
        type_name: &'static str,
        /// Offending text (trimmed)
        text: String,
    },

    /// The response entity was already handed out
    #[error("response entity was already consumed")]
    #[diagnostic(code(crest::decode::consumed))]
    EntityConsumed,

    /// The return type carries no serde hooks for structured formats
    #[error("`{type_name}` cannot be decoded from {format}")]
    #[diagnostic(
        code(crest::decode::unsupported),
        help("declare the return type with `ReturnType::serde::<T>()`")
    )]
    Unsupported {
        /// Declared return type
        type_name: &'static str,
        /// Format name
        format: &'static str,
    },
}

/// HTTP error response (status >= 400), carrying everything a retry or error handler
/// needs to inspect
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// Request method
    pub method: Method,
    /// Request URL
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpError {
    /// Response header value as text, if present and printable.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.status, self.method, self.url)?;
        if !self.body.is_empty() {
            if let Ok(s) = std::str::from_utf8(&self.body) {
                write!(f, ":\n{}", s)?;
            }
        }
        Ok(())
    }
}

/// Authentication and authorization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AuthError {
    /// Credentials are invalid or malformed
    #[error("Invalid credentials")]
    InvalidToken,

    /// Token refresh request failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The authorization scheme cannot refresh credentials
    #[error("Credentials cannot be refreshed")]
    RefreshUnsupported,

    /// Computing the signature failed
    #[error("Signing failed: {0}")]
    Signing(String),
}
