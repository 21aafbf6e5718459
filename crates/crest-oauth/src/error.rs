//! Token endpoint errors.

use crest_common::{AuthError, TransportError};
use http::StatusCode;
use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Errors emitted by OAuth signing and token endpoints.
#[derive(Debug, Error, Diagnostic)]
pub enum OAuthError {
    /// Computing the signature failed
    #[error("signing error: {0}")]
    #[diagnostic(code(crest_oauth::signing))]
    Signing(String),

    /// Token endpoint URL error
    #[error(transparent)]
    #[diagnostic(code(crest_oauth::url))]
    Url(#[from] url::ParseError),

    /// Could not build the token request
    #[error("invalid token request: {0}")]
    #[diagnostic(code(crest_oauth::request))]
    Request(#[from] http::Error),

    /// Token endpoint could not be reached
    #[error(transparent)]
    #[diagnostic(code(crest_oauth::transport))]
    Transport(TransportError),

    /// Token endpoint answered with an error status
    #[error("token endpoint returned {status}: {body}")]
    #[diagnostic(
        code(crest_oauth::http_status),
        help("the consumer credentials, verifier or session handle were likely rejected")
    )]
    HttpStatus {
        /// Response status
        status: StatusCode,
        /// Response body, lossily decoded
        body: String,
    },

    /// Token endpoint response was not url-encoded token data
    #[error("malformed token response: {0}")]
    #[diagnostic(code(crest_oauth::token_response))]
    TokenResponse(#[from] serde_html_form::de::Error),

    /// No refresh endpoint configured
    #[error("no token refresh endpoint configured")]
    #[diagnostic(code(crest_oauth::no_refresh_endpoint))]
    NoRefreshEndpoint,

    /// The current token cannot be refreshed
    #[error("token has no {0}")]
    #[diagnostic(
        code(crest_oauth::not_refreshable),
        help("session refresh needs an access token with a session handle")
    )]
    NotRefreshable(SmolStr),
}

impl OAuthError {
    pub(crate) fn transport(e: impl Into<TransportError>) -> Self {
        Self::Transport(e.into())
    }
}

impl From<OAuthError> for AuthError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::Signing(msg) => AuthError::Signing(msg),
            other => AuthError::RefreshFailed(Box::new(other)),
        }
    }
}

/// Result type for token endpoint calls.
pub type Result<T> = core::result::Result<T, OAuthError>;
