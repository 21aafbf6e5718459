use crest_common::http_client::HttpClient;
use crest_common::{AuthError, Authorization, AuthorizationToken, EncodedPair};
use http::Method;
use smol_str::SmolStr;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::request::{TokenEndpoint, refresh_access_token};
use crate::signature::{OAuthParams, SignatureMethod, header_credentials, sign_request};
use crate::token::{Consumer, OAuthToken};

/// OAuth 1.0a request signing with optional session refresh.
///
/// The token is shared by every invocation using this authorization. Every signed
/// header carries the generation of the token it was signed with. Refreshes are
/// serialized, and a refresh for a rejection of an older generation returns without
/// calling the endpoint.
pub struct OAuthAuthorization<C> {
    client: C,
    consumer: Consumer,
    state: RwLock<TokenState>,
    refresh_gate: Mutex<()>,
    refresh_endpoint: Option<TokenEndpoint>,
    realm: Option<SmolStr>,
    signature_method: SignatureMethod,
    send_version: bool,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<OAuthToken>,
    generation: u64,
}

impl<C> OAuthAuthorization<C> {
    /// Two-legged signing with consumer credentials only.
    ///
    /// `client` is used for refresh calls.
    pub fn new(client: C, consumer: Consumer) -> Self {
        Self {
            client,
            consumer,
            state: RwLock::new(TokenState::default()),
            refresh_gate: Mutex::new(()),
            refresh_endpoint: None,
            realm: None,
            signature_method: SignatureMethod::HmacSha1,
            send_version: true,
        }
    }

    /// Sign with an existing access token.
    pub fn with_token(mut self, token: OAuthToken) -> Self {
        self.state = RwLock::new(TokenState {
            token: Some(token),
            generation: 0,
        });
        self
    }

    /// Enable refresh through the session extension endpoint.
    pub fn with_refresh_endpoint(mut self, endpoint: TokenEndpoint) -> Self {
        self.refresh_endpoint = Some(endpoint);
        self
    }

    /// `realm` sent in the header.
    pub fn with_realm(mut self, realm: impl Into<SmolStr>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Signing method; HMAC-SHA1 by default.
    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    /// Leave out `oauth_version`, which RFC 5849 makes optional.
    pub fn without_version(mut self) -> Self {
        self.send_version = false;
        self
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> Option<OAuthToken> {
        self.state.read().await.token.clone()
    }

    /// Replace the token, e.g. after completing the three-legged flow.
    pub async fn set_token(&self, token: OAuthToken) {
        let mut state = self.state.write().await;
        state.token = Some(token);
        state.generation += 1;
    }
}

impl<C> std::fmt::Debug for OAuthAuthorization<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthAuthorization")
            .field("consumer", &self.consumer)
            .field("realm", &self.realm)
            .field("signature_method", &self.signature_method)
            .field("refreshable", &self.refresh_endpoint.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<C: HttpClient + Send + Sync> Authorization for OAuthAuthorization<C> {
    async fn authorize(
        &self,
        method: &Method,
        url: &Url,
        params: &[EncodedPair],
    ) -> Result<AuthorizationToken, AuthError> {
        let (token, generation) = {
            let state = self.state.read().await;
            (state.token.clone(), state.generation)
        };
        let mut oauth = OAuthParams::new(
            self.consumer.key.clone(),
            token.as_ref().map(|t| t.token.clone()),
            self.signature_method,
        );
        if !self.send_version {
            oauth.version = None;
        }
        let signature = sign_request(
            method,
            url,
            params,
            &oauth,
            &self.consumer.secret,
            token.as_ref().map(|t| t.secret.as_str()),
        )?;
        #[cfg(feature = "tracing")]
        tracing::trace!(base_string = %signature.base_string, "signed request");
        Ok(AuthorizationToken::new(
            "OAuth",
            header_credentials(self.realm.as_deref(), &oauth, &signature.value),
        )
        .with_generation(generation))
    }

    fn signs_entity(&self, content_type: Option<&str>) -> bool {
        content_type.is_some_and(|ct| {
            let mime = ct.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
    }

    fn can_refresh(&self) -> bool {
        self.refresh_endpoint.is_some()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    async fn refresh(&self, rejected: &AuthorizationToken) -> Result<(), AuthError> {
        let Some(endpoint) = &self.refresh_endpoint else {
            return Err(AuthError::RefreshUnsupported);
        };
        let _gate = self.refresh_gate.lock().await;

        let (current, generation) = {
            let state = self.state.read().await;
            (state.token.clone(), state.generation)
        };
        if generation != rejected.generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                rejected = rejected.generation,
                current = generation,
                "token already replaced since the rejected request"
            );
            return Ok(());
        }
        let Some(current) = current else {
            return Err(AuthError::InvalidToken);
        };

        let fresh = refresh_access_token(&self.client, endpoint, &self.consumer, &current).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(expires_at = ?fresh.expires_at, "access token refreshed");
        let mut state = self.state.write().await;
        state.token = Some(fresh);
        state.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct CountingClient {
        calls: Arc<AtomicUsize>,
        queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    }

    impl HttpClient for CountingClient {
        type Error = Infallible;

        async fn send_http(
            &self,
            _request: http::Request<Vec<u8>>,
        ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(self.queue.lock().await.pop_front().unwrap())
        }
    }

    fn url() -> Url {
        Url::parse("https://api.example.com/photos?size=original").unwrap()
    }

    #[tokio::test]
    async fn authorize_builds_oauth_header() {
        let auth = OAuthAuthorization::new(CountingClient::default(), Consumer::new("ck", "cs"))
            .with_token(OAuthToken::new("tok", "ts"))
            .with_realm("Photos");
        let token = auth
            .authorize(&Method::GET, &url(), &[EncodedPair::new("size", "original", false)])
            .await
            .unwrap();
        assert_eq!(token.scheme, "OAuth");
        assert!(token.value.starts_with("realm=\"Photos\", oauth_consumer_key=\"ck\""));
        assert!(token.value.contains("oauth_token=\"tok\""));
        assert!(token.value.contains("oauth_version=\"1.0\""));
        assert!(token.value.contains("oauth_signature=\""));
    }

    #[test]
    fn signs_only_form_entities() {
        let auth = OAuthAuthorization::new(CountingClient::default(), Consumer::new("ck", "cs"));
        assert!(auth.signs_entity(Some("application/x-www-form-urlencoded; charset=UTF-8")));
        assert!(!auth.signs_entity(Some("multipart/form-data; boundary=x")));
        assert!(!auth.signs_entity(None));
        assert!(!auth.can_refresh());
    }

    fn refreshable(client: &CountingClient) -> OAuthAuthorization<CountingClient> {
        OAuthAuthorization::new(client.clone(), Consumer::new("ck", "cs"))
            .with_token(OAuthToken::new("stale", "ss").with_session_handle("sh"))
            .with_refresh_endpoint(TokenEndpoint::new(
                Url::parse("https://api.example.com/oauth/refresh").unwrap(),
            ))
    }

    async fn queue_refresh(client: &CountingClient, token: &str) {
        let body = format!("oauth_token={token}&oauth_token_secret=fs&oauth_session_handle=sh");
        client
            .queue
            .lock()
            .await
            .push_back(http::Response::new(body.into_bytes()));
    }

    #[tokio::test]
    async fn concurrent_refreshes_call_endpoint_once() {
        let client = CountingClient::default();
        queue_refresh(&client, "fresh").await;

        let auth = Arc::new(refreshable(&client));
        assert!(auth.can_refresh());
        let rejected = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();

        let (a, b) = tokio::join!(auth.refresh(&rejected), auth.refresh(&rejected));
        a.unwrap();
        b.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.token().await.unwrap().token, "fresh");
    }

    #[tokio::test]
    async fn late_rejection_of_replaced_token_does_not_refresh() {
        let client = CountingClient::default();
        queue_refresh(&client, "fresh").await;
        queue_refresh(&client, "fresher").await;

        let auth = refreshable(&client);
        // Two requests signed with the same token, both rejected.
        let first = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();
        let second = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();
        assert!(first.value.contains("oauth_token=\"stale\""));

        auth.refresh(&second).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        auth.refresh(&first).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.token().await.unwrap().token, "fresh");

        // A rejection of the fresh token refreshes again.
        let third = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();
        assert!(third.value.contains("oauth_token=\"fresh\""));
        assert_ne!(third.generation, first.generation);
        auth.refresh(&third).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(auth.token().await.unwrap().token, "fresher");
    }

    #[tokio::test]
    async fn set_token_invalidates_earlier_rejections() {
        let client = CountingClient::default();
        let auth = refreshable(&client);
        let rejected = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();

        auth.set_token(OAuthToken::new("manual", "ms")).await;
        auth.refresh(&rejected).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.token().await.unwrap().token, "manual");
    }

    #[tokio::test]
    async fn failed_refresh_is_auth_error() {
        let client = CountingClient::default();
        let mut res = http::Response::new(b"oauth_problem=token_rejected".to_vec());
        *res.status_mut() = http::StatusCode::UNAUTHORIZED;
        client.queue.lock().await.push_back(res);

        let auth = refreshable(&client);
        let rejected = auth.authorize(&Method::GET, &url(), &[]).await.unwrap();
        assert!(matches!(
            auth.refresh(&rejected).await,
            Err(AuthError::RefreshFailed(_))
        ));
        assert_eq!(auth.token().await.unwrap().token, "stale");
    }
}
