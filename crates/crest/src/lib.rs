//! # crest
//!
//! Declarative REST client runtime: describe a remote method once, then invoke it with
//! plain arguments and get a typed result back.
//!
//! A [`MethodConfig`] names the verb, endpoint, path template and the parameters of one
//! call, each parameter with a destination (query, path, form, header, cookie or matrix).
//! At invocation time the arguments are bound into a [`Request`](request::Request),
//! encoded into the URL, headers and body, sent over an
//! [`HttpClient`](crest_common::http_client::HttpClient), retried according to the
//! method's policy, optionally signed (Basic or OAuth 1.0a), and the response body is
//! decoded into the declared return type.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crest::config::MethodConfig;
//! use crest::dispatch::ReturnType;
//! use crest::{Args, Crest, Destination, ParamConfig};
//! use http::Method;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let get_user = Arc::new(
//!         MethodConfig::builder(
//!             Method::GET,
//!             url::Url::parse("https://api.example.com/v1/").unwrap(),
//!             "/users/{id:[0-9]+}",
//!         )
//!         .accept("application/json")
//!         .param(ParamConfig::new("id", Destination::Path).build())
//!         .param(ParamConfig::new("verbose", Destination::Query).build())
//!         .returns(ReturnType::serde::<User>())
//!         .build()?,
//!     );
//!
//!     let crest = Crest::reqwest();
//!     let user: User = crest
//!         .invoke(&get_user, Args::new().push(42).push(true))
//!         .await?;
//!     println!("{} is {}", user.id, user.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! - [`crest_common`]: parameter model, encoding, path templates, transport and
//!   authorization traits, errors. Re-exported here.
//! - [`oauth`]: OAuth 1.0a signing, token endpoints and token refresh.

#![warn(missing_docs)]

pub use crest_common;
pub use crest_common::{
    ArgumentError, AuthError, Authorization, AuthorizationToken, BasicAuthorization, Charset,
    ClientError, ConfigError, DecodeError, Destination, EncodeError, HttpError, ParamConfig,
    ParamValue, TransportError, ValueType,
};
pub use crest_oauth as oauth;

pub mod channel;
/// The [`Crest`] entry point.
pub mod client;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod executor;
/// Invocation arguments bound to a method's parameters.
pub mod request;
/// Successful responses and their entity.
pub mod response;
pub mod retry;

pub use client::Crest;
pub use config::{MethodConfig, MethodDefaults};
pub use dispatch::ReturnType;
pub use request::Args;
pub use response::{EntityStream, Response};
