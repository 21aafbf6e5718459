//! The authorization seam between request construction and the transport.

use std::fmt;

use base64::Engine;
use http::{HeaderValue, Method};
use smol_str::SmolStr;
use url::Url;

use crate::error::AuthError;
use crate::param::EncodedPair;

/// Value of an `Authorization` header, split into scheme and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationToken {
    /// Scheme, e.g. `Basic` or `OAuth`
    pub scheme: SmolStr,
    /// Scheme-specific credentials
    pub value: String,
    /// Which credentials produced this token.
    ///
    /// Refreshing schemes bump it each time their credentials are replaced.
    pub generation: u64,
}

impl AuthorizationToken {
    /// Create a token for the initial credentials.
    pub fn new(scheme: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
            generation: 0,
        }
    }

    /// Same token, stamped with the credentials generation it was signed with.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// `<scheme> <value>` as a header value, marked sensitive.
    pub fn header_value(&self) -> Result<HeaderValue, AuthError> {
        let mut value = HeaderValue::try_from(self.to_string())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Display for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scheme, self.value)
    }
}

/// Produces `Authorization` headers for outgoing requests.
///
/// Implementations see the method, the full URL (query included) and, when
/// [`signs_entity`](Self::signs_entity) says so, the url-encoded body parameters.
#[async_trait::async_trait]
pub trait Authorization: fmt::Debug + Send + Sync {
    /// Compute the token for one request.
    async fn authorize(
        &self,
        method: &Method,
        url: &Url,
        params: &[EncodedPair],
    ) -> Result<AuthorizationToken, AuthError>;

    /// Whether body parameters of this content type take part in signing.
    fn signs_entity(&self, _content_type: Option<&str>) -> bool {
        false
    }

    /// Whether [`refresh`](Self::refresh) can obtain new credentials.
    fn can_refresh(&self) -> bool {
        false
    }

    /// Replace the credentials after the server rejected `rejected`.
    ///
    /// Does nothing when the credentials behind `rejected` were already replaced.
    async fn refresh(&self, _rejected: &AuthorizationToken) -> Result<(), AuthError> {
        Err(AuthError::RefreshUnsupported)
    }
}

/// HTTP Basic authentication.
#[derive(Clone)]
pub struct BasicAuthorization {
    credentials: String,
}

impl BasicAuthorization {
    /// Credentials for `username` and `password`.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            credentials: base64::engine::general_purpose::STANDARD
                .encode(format!("{username}:{password}")),
        }
    }
}

impl fmt::Debug for BasicAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthorization").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Authorization for BasicAuthorization {
    async fn authorize(
        &self,
        _method: &Method,
        _url: &Url,
        _params: &[EncodedPair],
    ) -> Result<AuthorizationToken, AuthError> {
        Ok(AuthorizationToken::new("Basic", self.credentials.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_header() {
        let auth = BasicAuthorization::new("Aladdin", "open sesame");
        let url = Url::parse("https://example.com/").unwrap();
        let token = auth.authorize(&Method::GET, &url, &[]).await.unwrap();
        assert_eq!(token.to_string(), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
        assert!(token.header_value().unwrap().is_sensitive());
        assert!(!auth.can_refresh());
        assert!(matches!(
            auth.refresh(&token).await,
            Err(AuthError::RefreshUnsupported)
        ));
    }
}
