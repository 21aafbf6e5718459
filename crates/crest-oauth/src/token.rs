use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use smol_str::SmolStr;

/// Consumer (client) credentials.
#[derive(Clone)]
pub struct Consumer {
    /// `oauth_consumer_key`
    pub key: SmolStr,
    /// Consumer secret
    pub secret: SmolStr,
}

impl Consumer {
    /// Credentials issued to the client application.
    pub fn new(key: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A request or access token with its secret and session extension data.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    /// `oauth_token`
    pub token: SmolStr,
    /// `oauth_token_secret`
    pub secret: SmolStr,
    /// `oauth_session_handle`, needed to refresh
    pub session_handle: Option<SmolStr>,
    /// When the access token stops working
    pub expires_at: Option<DateTime<Utc>>,
    /// When the session handle stops working
    pub authorization_expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Token without session extension data.
    pub fn new(token: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
            session_handle: None,
            expires_at: None,
            authorization_expires_at: None,
        }
    }

    /// Attach the session handle needed to refresh.
    pub fn with_session_handle(mut self, handle: impl Into<SmolStr>) -> Self {
        self.session_handle = Some(handle.into());
        self
    }

    /// Whether the token is known to have expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token", &self.token)
            .field("session_handle", &self.session_handle.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Url-encoded body of a token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub oauth_token: SmolStr,
    pub oauth_token_secret: SmolStr,
    pub oauth_session_handle: Option<SmolStr>,
    pub oauth_expires_in: Option<i64>,
    pub oauth_authorization_expires_in: Option<i64>,
    pub oauth_callback_confirmed: Option<SmolStr>,
}

impl TokenResponse {
    pub fn into_token(self, now: DateTime<Utc>) -> OAuthToken {
        let after = |secs: i64| now + TimeDelta::seconds(secs);
        OAuthToken {
            token: self.oauth_token,
            secret: self.oauth_token_secret,
            session_handle: self.oauth_session_handle,
            expires_at: self.oauth_expires_in.map(after),
            authorization_expires_at: self.oauth_authorization_expires_in.map(after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_extension_response() {
        let body = b"oauth_token=tok&oauth_token_secret=sec&oauth_session_handle=h%2B1\
                     &oauth_expires_in=3600&oauth_authorization_expires_in=86400";
        let resp: TokenResponse = serde_html_form::from_bytes(body).unwrap();
        let now = Utc::now();
        let token = resp.into_token(now);
        assert_eq!(token.token, "tok");
        assert_eq!(token.secret, "sec");
        assert_eq!(token.session_handle.as_deref(), Some("h+1"));
        assert_eq!(token.expires_at, Some(now + TimeDelta::seconds(3600)));
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + TimeDelta::hours(2)));
    }

    #[test]
    fn debug_hides_secrets() {
        let token = OAuthToken::new("tok", "very-secret");
        assert!(!format!("{token:?}").contains("very-secret"));
        let consumer = Consumer::new("key", "also-secret");
        assert!(!format!("{consumer:?}").contains("also-secret"));
    }
}
