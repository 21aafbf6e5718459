//! Sending a bound [`Request`]: one attempt at a time, and the retry loop around them.

use std::sync::Arc;

use crest_common::encode::{encode_params, to_cookie_header, to_matrix_string, to_query_string};
use crest_common::http_client::HttpClient;
use crest_common::{ArgumentError, AuthorizationToken, ClientError, Destination, HttpError};
use http::header::{self, HeaderName, HeaderValue};
use smol_str::SmolStr;
use url::Url;

use crate::channel::{AuthorizationChannel, ClientChannel, HttpChannel, HttpResource};
use crate::entity::HttpEntity;
use crate::request::Request;
use crate::response::Response;
use crate::retry::{RefreshingRetryHandler, RetryDecision, RetryHandler};

/// Performs single attempts.
pub struct RequestExecutor<'c, C> {
    client: &'c C,
}

impl<'c, C: HttpClient + Sync> RequestExecutor<'c, C> {
    /// Executor sending through `client`.
    pub fn new(client: &'c C) -> Self {
        Self { client }
    }

    /// Send `request` once.
    ///
    /// Responses with status 400 and above come back as [`ClientError::Http`].
    pub async fn execute(
        &self,
        request: &Arc<Request>,
        entity: Option<&HttpEntity>,
    ) -> Result<Response, ClientError> {
        self.attempt(request, entity).await.1
    }

    /// Send `request` once, also returning the authorization token it carried.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn attempt(
        &self,
        request: &Arc<Request>,
        entity: Option<&HttpEntity>,
    ) -> (Option<AuthorizationToken>, Result<Response, ClientError>) {
        let config = request.config();
        let (url, channel) = match self.open(request) {
            Ok(opened) => opened,
            Err(e) => return (None, Err(e)),
        };

        let entity = entity.filter(|_| request.has(Destination::Form)).cloned();
        let (token, resource) = match config.authorization() {
            Some(authorization) => {
                let mut channel = AuthorizationChannel::new(channel, authorization.clone());
                if let Some(entity) = entity {
                    if let Err(e) = channel.write_entity(entity) {
                        return (None, Err(e));
                    }
                }
                channel.send_signed().await
            }
            None => (None, send(channel, entity).await),
        };
        (token, resource.and_then(|resource| finish(request, url, resource)))
    }

    /// Fresh channel with timeouts, `Accept`, header params and cookies applied.
    fn open(&self, request: &Request) -> Result<(Url, ClientChannel<'c, C>), ClientError> {
        let config = request.config();
        let url = request_url(request)?;
        let mut channel = ClientChannel::open(self.client, config.method().clone(), url.clone());

        channel.set_timeouts(config.timeouts());
        if let Some(accept) = config.accept() {
            channel.set_header(header::ACCEPT, header_value(header::ACCEPT.as_str(), accept)?);
        }
        let charset = request.charset();
        for pair in encode_params(request.params(Destination::Header), charset)? {
            let name = HeaderName::from_bytes(pair.name.as_bytes()).map_err(|e| {
                ArgumentError::InvalidHeader {
                    name: pair.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            channel.add_header(name, header_value(&pair.name, &pair.value)?);
        }
        let cookies = encode_params(request.params(Destination::Cookie), charset)?;
        if let Some(cookie) = to_cookie_header(&cookies) {
            channel.set_header(header::COOKIE, header_value(header::COOKIE.as_str(), &cookie)?);
        }
        Ok((url, channel))
    }
}

fn finish(
    request: &Arc<Request>,
    url: Url,
    resource: HttpResource,
) -> Result<Response, ClientError> {
    #[cfg(feature = "tracing")]
    tracing::debug!(status = %resource.status(), %url, "response");

    if resource.status().as_u16() >= 400 {
        let (status, headers, body) = resource.into_parts();
        return Err(HttpError {
            method: request.config().method().clone(),
            url,
            status,
            headers,
            body,
        }
        .into());
    }
    Ok(Response::new(resource, request.clone()))
}

async fn send<Ch: HttpChannel + Send>(
    mut channel: Ch,
    entity: Option<HttpEntity>,
) -> Result<HttpResource, ClientError> {
    if let Some(entity) = entity {
        channel.write_entity(entity)?;
    }
    channel.send().await
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ArgumentError> {
    HeaderValue::from_str(value).map_err(|e| ArgumentError::InvalidHeader {
        name: SmolStr::new(name),
        reason: e.to_string(),
    })
}

/// Endpoint path, resolved template and matrix parameters, then the query string
/// appended to any query the endpoint already has.
pub fn request_url(request: &Request) -> Result<Url, ClientError> {
    let config = request.config();
    let charset = request.charset();

    let mut resolver = config.template().resolver(charset);
    for pair in encode_params(request.params(Destination::Path), charset)? {
        resolver.merge(&pair.name, &pair.value, pair.encoded)?;
    }
    let resolved = resolver.build()?;
    let matrix = to_matrix_string(
        &encode_params(request.params(Destination::Matrix), charset)?,
        charset,
    )?;
    let query = to_query_string(
        &encode_params(request.params(Destination::Query), charset)?,
        charset,
    )?;

    let mut url = config.endpoint().clone();
    let base = url.path().trim_end_matches('/');
    let separator = if resolved.is_empty() || resolved.starts_with('/') {
        ""
    } else {
        "/"
    };
    let path = format!("{base}{separator}{resolved}{matrix}");
    url.set_path(&path);

    if !query.is_empty() {
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query,
        };
        url.set_query(Some(&query));
    }
    Ok(url)
}

/// Runs attempts until one succeeds or the retry policy gives up.
///
/// When the method's authorization can refresh credentials, the configured handler is
/// wrapped in a [`RefreshingRetryHandler`], and a refresh does not count as an attempt.
pub struct RetryExecutor<'c, C> {
    executor: RequestExecutor<'c, C>,
}

impl<'c, C: HttpClient + Sync> RetryExecutor<'c, C> {
    /// Retry loop sending through `client`.
    pub fn new(client: &'c C) -> Self {
        Self {
            executor: RequestExecutor::new(client),
        }
    }

    /// Send `request` until the retry policy stops.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip_all,
            fields(
                method = %request.config().method(),
                path = %request.config().template()
            )
        )
    )]
    pub async fn execute(
        &self,
        request: &Arc<Request>,
        entity: Option<&HttpEntity>,
    ) -> Result<Response, ClientError> {
        let config = request.config();
        let configured: &dyn RetryHandler = config.retry_handler().as_ref();
        let authorization = config.authorization().filter(|a| a.can_refresh());
        let refreshing;
        let handler: &dyn RetryHandler = match authorization {
            Some(_) => {
                refreshing = RefreshingRetryHandler::new(configured);
                &refreshing
            }
            None => configured,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (credentials, result) = self.executor.attempt(request, entity).await;
            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            if !error.is_retryable() {
                return Err(error);
            }

            match handler.decide(request, attempt, &error) {
                RetryDecision::Fail => return Err(error),
                RetryDecision::RefreshAndRetry => {
                    let (Some(authorization), Some(rejected)) = (authorization, &credentials)
                    else {
                        return Err(error);
                    };
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, %error, "refreshing credentials");
                    authorization.refresh(rejected).await?;
                    attempt -= 1;
                }
                RetryDecision::Retry => {
                    let delay = handler.backoff(attempt, &error);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, ?delay, %error, "attempt failed, retrying");
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
