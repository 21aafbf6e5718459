//! Common building blocks for the crest REST client runtime.
//!
//! This crate holds the pieces every layer above it agrees on: the parameter model and
//! how parameters turn into wire-ready name/value pairs, URI path templates, the raw
//! [`HttpClient`](http_client::HttpClient) transport abstraction, the
//! [`Authorization`](auth::Authorization) seam, and the error taxonomy.

#![warn(missing_docs)]
pub use smol_str;
pub use url;

pub mod auth;
pub mod charset;
/// Turning bound parameters into [`EncodedPair`](param::EncodedPair)s.
pub mod encode;
pub mod error;
/// HTTP client abstraction used by crest crates.
pub mod http_client;
pub mod param;
pub mod path;
pub mod serializer;

pub use auth::{Authorization, AuthorizationToken, BasicAuthorization};
pub use charset::Charset;
pub use error::{
    ArgumentError, AuthError, ClientError, ConfigError, DecodeError, EncodeError, HttpError,
    TransportError,
};
pub use param::{Destination, EncodedPair, Param, ParamConfig, ParamValue, ValueType};
