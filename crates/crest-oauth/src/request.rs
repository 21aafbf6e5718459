//! Token endpoints of the three-legged flow and the session refresh extension.

use chrono::Utc;
use crest_common::http_client::HttpClient;
use http::{Method, Request, header};
use url::Url;

use crate::error::{OAuthError, Result};
use crate::signature::{OAuthParams, SignatureMethod, header_credentials, sign_request};
use crate::token::{Consumer, OAuthToken, TokenResponse};

/// Where and how to call one token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    /// Endpoint URL
    pub url: Url,
    /// HTTP method, POST unless the provider says otherwise
    pub method: Method,
    /// Signature method for the endpoint call
    pub signature_method: SignatureMethod,
    /// Optional `realm`
    pub realm: Option<String>,
}

impl TokenEndpoint {
    /// `POST` endpoint at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::POST,
            signature_method: SignatureMethod::HmacSha1,
            realm: None,
        }
    }

    /// Use `method` instead of `POST`.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Obtain a temporary (request) token. `callback` defaults to `oob`.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %endpoint.url)))]
pub async fn fetch_request_token<C: HttpClient + Sync>(
    client: &C,
    endpoint: &TokenEndpoint,
    consumer: &Consumer,
    callback: Option<&str>,
) -> Result<OAuthToken> {
    let params = OAuthParams::new(consumer.key.clone(), None, endpoint.signature_method)
        .with("oauth_callback", callback.unwrap_or("oob"));
    token_request(client, endpoint, consumer, None, params).await
}

/// Exchange an authorized request token and its verifier for an access token.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %endpoint.url)))]
pub async fn fetch_access_token<C: HttpClient + Sync>(
    client: &C,
    endpoint: &TokenEndpoint,
    consumer: &Consumer,
    request_token: &OAuthToken,
    verifier: &str,
) -> Result<OAuthToken> {
    let params = OAuthParams::new(
        consumer.key.clone(),
        Some(request_token.token.clone()),
        endpoint.signature_method,
    )
    .with("oauth_verifier", verifier);
    token_request(client, endpoint, consumer, Some(request_token), params).await
}

/// Trade an expired access token and its session handle for a new access token.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(url = %endpoint.url)))]
pub async fn refresh_access_token<C: HttpClient + Sync>(
    client: &C,
    endpoint: &TokenEndpoint,
    consumer: &Consumer,
    token: &OAuthToken,
) -> Result<OAuthToken> {
    let Some(handle) = token.session_handle.as_ref() else {
        return Err(OAuthError::NotRefreshable("session handle".into()));
    };
    let params = OAuthParams::new(
        consumer.key.clone(),
        Some(token.token.clone()),
        endpoint.signature_method,
    )
    .with("oauth_session_handle", handle.as_str());
    let mut refreshed = token_request(client, endpoint, consumer, Some(token), params).await?;
    // Providers may omit the handle when it does not change.
    if refreshed.session_handle.is_none() {
        refreshed.session_handle = Some(handle.clone());
    }
    Ok(refreshed)
}

async fn token_request<C: HttpClient + Sync>(
    client: &C,
    endpoint: &TokenEndpoint,
    consumer: &Consumer,
    token: Option<&OAuthToken>,
    params: OAuthParams,
) -> Result<OAuthToken> {
    let signature = sign_request(
        &endpoint.method,
        &endpoint.url,
        &[],
        &params,
        &consumer.secret,
        token.map(|t| t.secret.as_str()),
    )?;
    let credentials = header_credentials(endpoint.realm.as_deref(), &params, &signature.value);

    let req = Request::builder()
        .method(endpoint.method.clone())
        .uri(endpoint.url.as_str())
        .header(header::AUTHORIZATION, format!("OAuth {credentials}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Vec::new())?;

    let res = client
        .send_http(req)
        .await
        .map_err(OAuthError::transport)?;

    if !res.status().is_success() {
        return Err(OAuthError::HttpStatus {
            status: res.status(),
            body: String::from_utf8_lossy(res.body()).into_owned(),
        });
    }
    let response: TokenResponse = serde_html_form::from_bytes(res.body())?;
    #[cfg(feature = "tracing")]
    if response.oauth_callback_confirmed.as_deref() == Some("false") {
        tracing::warn!("provider did not confirm oauth_callback");
    }
    Ok(response.into_token(Utc::now()))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct MockClient {
        queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
        log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
    }

    impl MockClient {
        async fn push(&self, status: u16, body: &str) {
            let mut res = http::Response::new(body.as_bytes().to_vec());
            *res.status_mut() = http::StatusCode::from_u16(status).unwrap();
            self.queue.lock().await.push_back(res);
        }
    }

    impl HttpClient for MockClient {
        type Error = Infallible;

        async fn send_http(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
            self.log.lock().await.push(request);
            Ok(self.queue.lock().await.pop_front().unwrap())
        }
    }

    fn endpoint() -> TokenEndpoint {
        TokenEndpoint::new(Url::parse("https://api.example.com/oauth/token").unwrap())
    }

    #[tokio::test]
    async fn request_token_sends_callback() {
        let client = MockClient::default();
        client
            .push(200, "oauth_token=rt&oauth_token_secret=rs&oauth_callback_confirmed=true")
            .await;
        let consumer = Consumer::new("ck", "cs");
        let token = fetch_request_token(&client, &endpoint(), &consumer, Some("https://app/cb"))
            .await
            .unwrap();
        assert_eq!(token.token, "rt");

        let log = client.log.lock().await;
        let auth = log[0].headers()[header::AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("OAuth oauth_consumer_key=\"ck\""));
        assert!(auth.contains("oauth_callback=\"https%3A%2F%2Fapp%2Fcb\""));
        assert!(!auth.contains("oauth_token="));
    }

    #[tokio::test]
    async fn access_token_sends_verifier() {
        let client = MockClient::default();
        client
            .push(200, "oauth_token=at&oauth_token_secret=as&oauth_session_handle=sh")
            .await;
        let consumer = Consumer::new("ck", "cs");
        let token = fetch_access_token(
            &client,
            &endpoint(),
            &consumer,
            &OAuthToken::new("rt", "rs"),
            "v1",
        )
        .await
        .unwrap();
        assert_eq!(token.session_handle.as_deref(), Some("sh"));

        let log = client.log.lock().await;
        let auth = log[0].headers()[header::AUTHORIZATION].to_str().unwrap();
        assert!(auth.contains("oauth_token=\"rt\""));
        assert!(auth.contains("oauth_verifier=\"v1\""));
    }

    #[tokio::test]
    async fn refresh_keeps_handle_and_surfaces_status() {
        let client = MockClient::default();
        client
            .push(200, "oauth_token=new&oauth_token_secret=ns&oauth_expires_in=60")
            .await;
        client.push(401, "oauth_problem=token_rejected").await;
        let consumer = Consumer::new("ck", "cs");
        let old = OAuthToken::new("old", "os").with_session_handle("sh");

        let fresh = refresh_access_token(&client, &endpoint(), &consumer, &old)
            .await
            .unwrap();
        assert_eq!(fresh.token, "new");
        assert_eq!(fresh.session_handle.as_deref(), Some("sh"));
        assert!(fresh.expires_at.is_some());

        let err = refresh_access_token(&client, &endpoint(), &consumer, &old)
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::HttpStatus { status, .. } if status == 401));
    }

    #[tokio::test]
    async fn refresh_needs_session_handle() {
        let client = MockClient::default();
        let err = refresh_access_token(
            &client,
            &endpoint(),
            &Consumer::new("ck", "cs"),
            &OAuthToken::new("t", "s"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OAuthError::NotRefreshable(_)));
        assert!(client.log.lock().await.is_empty());
    }
}
