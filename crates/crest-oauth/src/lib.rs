//! OAuth 1.0a for crest.
//!
//! [`OAuthAuthorization`] signs every request with HMAC-SHA1 (or PLAINTEXT) per RFC 5849,
//! and, when a session refresh endpoint is configured, swaps in a fresh access token after
//! the server rejects the current one. The [`request`] module covers the token endpoints
//! of the three-legged flow.

#![warn(missing_docs)]

/// Signing requests made through crest methods.
pub mod authorization;
pub mod error;
pub mod request;
pub mod signature;
/// Consumer credentials and tokens.
pub mod token;

pub use authorization::OAuthAuthorization;
pub use error::OAuthError;
pub use signature::SignatureMethod;
pub use token::{Consumer, OAuthToken};
