//! Per-method configuration.
//!
//! A [`MethodConfig`] describes one remote call: verb, endpoint, path template, declared
//! parameters, how the body is written, how the result is read, and the retry and
//! authorization policies. It is built once, validated, and shared behind an `Arc` by
//! every invocation.

use std::sync::Arc;
use std::time::Duration;

use crest_common::http_client::Timeouts;
use crest_common::param::{Param, ParamConfig, ParamValue};
use crest_common::path::UriTemplate;
use crest_common::{Authorization, Charset, ConfigError};
use http::Method;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

use crate::dispatch::{Deserializer, ReturnType};
use crate::entity::{
    BodySerializers, EntityWriter, MultipartEntityWriter, SerializerEntityWriter,
    UrlEncodedEntityWriter, essence,
};
use crate::retry::{MaxAttemptsRetryHandler, RetryHandler};

/// Defaults applied to every method field that is not set explicitly.
///
/// Deserializable from configuration files; timeouts are in milliseconds.
///
/// ```
/// # use crest::config::MethodDefaults;
/// let defaults: MethodDefaults =
///     serde_json::from_str(r#"{"socket-timeout-ms": 5000, "charset": "ISO-8859-1"}"#).unwrap();
/// assert_eq!(defaults.socket_timeout_ms, Some(5000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MethodDefaults {
    /// Socket (read) timeout
    pub socket_timeout_ms: Option<u64>,
    /// Connection timeout
    pub connection_timeout_ms: Option<u64>,
    /// Request charset
    pub charset: Option<Charset>,
    /// `Accept` header
    pub accept: Option<SmolStr>,
    /// Request content type
    pub content_type: Option<SmolStr>,
    /// Attempts before giving up, including the first
    pub max_attempts: Option<u32>,
}

impl MethodDefaults {
    /// 20 s timeouts, UTF-8, a single attempt.
    pub fn builtin() -> Self {
        Self {
            socket_timeout_ms: Some(20_000),
            connection_timeout_ms: Some(20_000),
            charset: Some(Charset::Utf8),
            accept: None,
            content_type: None,
            max_attempts: Some(1),
        }
    }
}

/// Field-by-field merge: anything set in `overrides` wins, the rest comes from `base`.
pub fn merge(base: &MethodDefaults, overrides: &MethodDefaults) -> MethodDefaults {
    MethodDefaults {
        socket_timeout_ms: overrides.socket_timeout_ms.or(base.socket_timeout_ms),
        connection_timeout_ms: overrides
            .connection_timeout_ms
            .or(base.connection_timeout_ms),
        charset: overrides.charset.or(base.charset),
        accept: overrides.accept.clone().or_else(|| base.accept.clone()),
        content_type: overrides
            .content_type
            .clone()
            .or_else(|| base.content_type.clone()),
        max_attempts: overrides.max_attempts.or(base.max_attempts),
    }
}

/// Immutable description of one remote method.
#[derive(Debug)]
pub struct MethodConfig {
    method: Method,
    endpoint: Url,
    template: UriTemplate,
    content_type: Option<SmolStr>,
    accept: Option<SmolStr>,
    timeouts: Timeouts,
    charset: Charset,
    entity_writer: Arc<dyn EntityWriter>,
    deserializers: Vec<Arc<dyn Deserializer>>,
    authorization: Option<Arc<dyn Authorization>>,
    retry_handler: Arc<dyn RetryHandler>,
    extra_params: Vec<Param>,
    return_type: ReturnType,
    params: Vec<Arc<ParamConfig>>,
}

impl MethodConfig {
    /// Start configuring `method` on `path` below `endpoint`.
    pub fn builder(method: Method, endpoint: Url, path: impl Into<SmolStr>) -> MethodConfigBuilder {
        MethodConfigBuilder::new(method, endpoint, path.into())
    }

    /// HTTP verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Base URL the path template is appended to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Parsed path template.
    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    /// Declared request content type.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// `Accept` header sent with every request.
    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    /// Connect and socket timeouts.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Charset for encoding parameters and decoding text bodies without one.
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Writer for the FORM parameters.
    pub fn entity_writer(&self) -> &Arc<dyn EntityWriter> {
        &self.entity_writer
    }

    /// Explicit deserializers, tried in order before any registry.
    pub fn deserializers(&self) -> &[Arc<dyn Deserializer>] {
        &self.deserializers
    }

    /// Authorization applied to every request, if any.
    pub fn authorization(&self) -> Option<&Arc<dyn Authorization>> {
        self.authorization.as_ref()
    }

    /// Retry policy.
    pub fn retry_handler(&self) -> &Arc<dyn RetryHandler> {
        &self.retry_handler
    }

    /// Parameters sent on every invocation.
    pub fn extra_params(&self) -> &[Param] {
        &self.extra_params
    }

    /// Declared result type of [`Crest::invoke`](crate::Crest::invoke).
    pub fn return_type(&self) -> &ReturnType {
        &self.return_type
    }

    /// Declared parameters, in argument order.
    pub fn params(&self) -> &[Arc<ParamConfig>] {
        &self.params
    }
}

/// Builder for [`MethodConfig`]; [`build`](Self::build) validates.
pub struct MethodConfigBuilder {
    method: Method,
    endpoint: Url,
    path: SmolStr,
    defaults: MethodDefaults,
    content_type: Option<SmolStr>,
    accept: Option<SmolStr>,
    socket_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
    charset: Option<Charset>,
    entity_writer: Option<Arc<dyn EntityWriter>>,
    body_serializers: Option<BodySerializers>,
    deserializers: Vec<Arc<dyn Deserializer>>,
    authorization: Option<Arc<dyn Authorization>>,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    max_attempts: Option<u32>,
    extra_params: Vec<Param>,
    return_type: Option<ReturnType>,
    params: Vec<Arc<ParamConfig>>,
}

impl MethodConfigBuilder {
    fn new(method: Method, endpoint: Url, path: SmolStr) -> Self {
        Self {
            method,
            endpoint,
            path,
            defaults: MethodDefaults::default(),
            content_type: None,
            accept: None,
            socket_timeout: None,
            connection_timeout: None,
            charset: None,
            entity_writer: None,
            body_serializers: None,
            deserializers: Vec::new(),
            authorization: None,
            retry_handler: None,
            max_attempts: None,
            extra_params: Vec::new(),
            return_type: None,
            params: Vec::new(),
        }
    }

    /// Fallbacks for every field not set on this builder.
    pub fn defaults(mut self, defaults: MethodDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Request content type; picks the entity writer unless one is set explicitly.
    pub fn content_type(mut self, content_type: impl Into<SmolStr>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// `Accept` header.
    pub fn accept(mut self, accept: impl Into<SmolStr>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Read timeout.
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    /// Connect timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Request charset.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Use this writer regardless of the content type.
    pub fn entity_writer(mut self, writer: Arc<dyn EntityWriter>) -> Self {
        self.entity_writer = Some(writer);
        self
    }

    /// Registry consulted for custom content types.
    pub fn body_serializers(mut self, serializers: BodySerializers) -> Self {
        self.body_serializers = Some(serializers);
        self
    }

    /// Append an explicit deserializer.
    pub fn deserializer(mut self, deserializer: Arc<dyn Deserializer>) -> Self {
        self.deserializers.push(deserializer);
        self
    }

    /// Sign every request with `authorization`.
    pub fn authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Replace the attempt-count policy set by `max_attempts`.
    pub fn retry_handler(mut self, handler: Arc<dyn RetryHandler>) -> Self {
        self.retry_handler = Some(handler);
        self
    }

    /// Attempts for the default retry handler.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// A parameter sent with a fixed value on every invocation.
    pub fn extra_param(mut self, config: ParamConfig, value: impl Into<ParamValue>) -> Self {
        self.extra_params
            .push(Param::new(Arc::new(config), vec![value.into()]));
        self
    }

    /// Declare the next positional parameter.
    pub fn param(mut self, config: ParamConfig) -> Self {
        self.params.push(Arc::new(config));
        self
    }

    /// Declared result type, `Bytes` unless set.
    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Validate and freeze.
    ///
    /// Fails on an invalid path template, a param naming no placeholder, or a content type
    /// no body serializer handles.
    pub fn build(self) -> Result<MethodConfig, ConfigError> {
        let defaults = merge(&MethodDefaults::builtin(), &self.defaults);
        let template = UriTemplate::parse(&self.path)?;
        let charset = self.charset.or(defaults.charset).unwrap_or_default();
        let content_type = self.content_type.or(defaults.content_type);

        let millis = |ms: Option<u64>| Duration::from_millis(ms.unwrap_or(20_000));
        let timeouts = Timeouts {
            connect: self
                .connection_timeout
                .unwrap_or_else(|| millis(defaults.connection_timeout_ms)),
            socket: self
                .socket_timeout
                .unwrap_or_else(|| millis(defaults.socket_timeout_ms)),
        };

        let entity_writer: Arc<dyn EntityWriter> = match (self.entity_writer, content_type.as_deref()) {
            (Some(writer), _) => writer,
            (None, None) => Arc::new(UrlEncodedEntityWriter),
            (None, Some(ct)) => match essence(ct).as_str() {
                UrlEncodedEntityWriter::MEDIA_TYPE => Arc::new(UrlEncodedEntityWriter),
                MultipartEntityWriter::MEDIA_TYPE => Arc::new(MultipartEntityWriter::new()),
                _ => {
                    let registry = self.body_serializers.unwrap_or_default();
                    let serializer = registry.lookup(ct).ok_or_else(|| {
                        ConfigError::NoBodySerializer {
                            content_type: ct.into(),
                        }
                    })?;
                    Arc::new(SerializerEntityWriter::new(ct, serializer))
                }
            },
        };

        let retry_handler = match self.retry_handler {
            Some(handler) => handler,
            None => Arc::new(MaxAttemptsRetryHandler::new(
                self.max_attempts
                    .or(defaults.max_attempts)
                    .unwrap_or(1)
                    .max(1),
            )),
        };

        Ok(MethodConfig {
            method: self.method,
            endpoint: self.endpoint,
            template,
            content_type,
            accept: self.accept.or(defaults.accept),
            timeouts,
            charset,
            entity_writer,
            deserializers: self.deserializers,
            authorization: self.authorization,
            retry_handler,
            extra_params: self.extra_params,
            return_type: self.return_type.unwrap_or_else(ReturnType::of::<bytes::Bytes>),
            params: self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://api.example.com/v1/").unwrap()
    }

    #[test]
    fn merge_prefers_overrides_field_by_field() {
        let base = MethodDefaults {
            socket_timeout_ms: Some(1000),
            connection_timeout_ms: Some(2000),
            charset: Some(Charset::Utf8),
            accept: Some("application/json".into()),
            content_type: None,
            max_attempts: Some(3),
        };
        let overrides = MethodDefaults {
            socket_timeout_ms: Some(5),
            charset: Some(Charset::Latin1),
            content_type: Some("application/xml".into()),
            ..Default::default()
        };
        let merged = merge(&base, &overrides);
        assert_eq!(merged.socket_timeout_ms, Some(5));
        assert_eq!(merged.connection_timeout_ms, Some(2000));
        assert_eq!(merged.charset, Some(Charset::Latin1));
        assert_eq!(merged.accept.as_deref(), Some("application/json"));
        assert_eq!(merged.content_type.as_deref(), Some("application/xml"));
        assert_eq!(merged.max_attempts, Some(3));
        assert_eq!(merge(&base, &MethodDefaults::default()), base);
    }

    #[test]
    fn defaults_deserialize_kebab_case() {
        let defaults: MethodDefaults = serde_json::from_str(
            r#"{"connection-timeout-ms": 250, "max-attempts": 4, "accept": "text/xml"}"#,
        )
        .unwrap();
        assert_eq!(defaults.connection_timeout_ms, Some(250));
        assert_eq!(defaults.max_attempts, Some(4));
        assert_eq!(defaults.socket_timeout_ms, None);
    }

    #[test]
    fn builtin_defaults() {
        let config = MethodConfig::builder(Method::GET, endpoint(), "/ping")
            .build()
            .unwrap();
        assert_eq!(config.timeouts(), Timeouts::DEFAULT);
        assert_eq!(config.charset(), Charset::Utf8);
        assert!(config.return_type().is::<bytes::Bytes>());
        assert!(config.authorization().is_none());
    }

    #[test]
    fn explicit_fields_beat_defaults() {
        let config = MethodConfig::builder(Method::GET, endpoint(), "/ping")
            .defaults(MethodDefaults {
                socket_timeout_ms: Some(100),
                connection_timeout_ms: Some(200),
                accept: Some("text/plain".into()),
                ..Default::default()
            })
            .socket_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        assert_eq!(config.timeouts().socket, Duration::from_secs(3));
        assert_eq!(config.timeouts().connect, Duration::from_millis(200));
        assert_eq!(config.accept(), Some("text/plain"));
    }

    #[test]
    fn unknown_content_type_has_no_serializer() {
        let err = MethodConfig::builder(Method::POST, endpoint(), "/x")
            .content_type("application/x-protobuf")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoBodySerializer { .. }));
    }

    #[test]
    fn invalid_template_fails_build() {
        let err = MethodConfig::builder(Method::GET, endpoint(), "/x/{id")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }
}
