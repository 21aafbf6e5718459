//! RFC 5849 signature base strings and signing.

use std::fmt;

use base64::Engine;
use crest_common::EncodedPair;
use crest_common::encode::UNRESERVED;
use hmac::{Hmac, Mac};
use http::Method;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;
use smol_str::SmolStr;
use url::Url;

use crate::error::{OAuthError, Result};

/// OAuth protocol version sent as `oauth_version`.
pub const OAUTH_VERSION: &str = "1.0";

/// How requests are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMethod {
    /// HMAC-SHA1 over the signature base string
    #[default]
    HmacSha1,
    /// The signing key itself, for use over TLS only
    Plaintext,
}

impl SignatureMethod {
    /// Value of `oauth_signature_method`.
    pub const fn name(self) -> &'static str {
        match self {
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
            SignatureMethod::Plaintext => "PLAINTEXT",
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RFC 3986 percent-encoding as RFC 5849 §3.6 requires.
pub fn encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, UNRESERVED).to_string()
}

/// Random alphanumeric nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// The `oauth_*` protocol parameters of one signed request, minus the signature.
#[derive(Debug, Clone)]
pub struct OAuthParams {
    /// `oauth_consumer_key`
    pub consumer_key: SmolStr,
    /// `oauth_token`, absent for two-legged and request-token calls
    pub token: Option<SmolStr>,
    /// `oauth_nonce`
    pub nonce: String,
    /// `oauth_timestamp`, seconds since the epoch
    pub timestamp: i64,
    /// `oauth_signature_method`
    pub signature_method: SignatureMethod,
    /// `oauth_version`, optional per RFC 5849
    pub version: Option<&'static str>,
    /// Other protocol parameters, e.g. `oauth_callback` or `oauth_session_handle`
    pub extra: Vec<(SmolStr, String)>,
}

impl OAuthParams {
    /// Fresh nonce and current timestamp.
    pub fn new(
        consumer_key: impl Into<SmolStr>,
        token: Option<SmolStr>,
        signature_method: SignatureMethod,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            token,
            nonce: generate_nonce(),
            timestamp: chrono::Utc::now().timestamp(),
            signature_method,
            version: Some(OAUTH_VERSION),
            extra: Vec::new(),
        }
    }

    /// Add an extra `oauth_*` parameter.
    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// All protocol parameters in header order.
    pub fn pairs(&self) -> Vec<(SmolStr, String)> {
        let mut pairs = vec![(
            SmolStr::new_static("oauth_consumer_key"),
            self.consumer_key.to_string(),
        )];
        if let Some(token) = &self.token {
            pairs.push((SmolStr::new_static("oauth_token"), token.to_string()));
        }
        pairs.push((
            SmolStr::new_static("oauth_signature_method"),
            self.signature_method.name().to_string(),
        ));
        pairs.push((
            SmolStr::new_static("oauth_timestamp"),
            self.timestamp.to_string(),
        ));
        pairs.push((SmolStr::new_static("oauth_nonce"), self.nonce.clone()));
        if let Some(version) = self.version {
            pairs.push((SmolStr::new_static("oauth_version"), version.to_string()));
        }
        pairs.extend(self.extra.iter().cloned());
        pairs
    }
}

/// Scheme and host lowercased, default port dropped, no query or fragment.
pub fn normalize_url(url: &Url) -> String {
    let mut out = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    out
}

/// Request parameters plus protocol parameters, encoded, sorted and `&`-joined.
///
/// Request parameters marked as encoded are decoded first so every value is encoded
/// exactly once.
pub fn normalize_params(params: &[EncodedPair], oauth: &[(SmolStr, String)]) -> String {
    let decode = |s: &str, encoded: bool| {
        if encoded {
            percent_encoding::percent_decode_str(s)
                .decode_utf8_lossy()
                .into_owned()
        } else {
            s.to_string()
        }
    };
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|p| {
            (
                encode(&decode(&p.name, p.encoded)),
                encode(&decode(&p.value, p.encoded)),
            )
        })
        .chain(
            oauth
                .iter()
                .filter(|(name, _)| name != "oauth_signature")
                .map(|(name, value)| (encode(name), encode(value))),
        )
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// `METHOD&enc(base-url)&enc(normalized params)`.
pub fn base_string(
    method: &Method,
    url: &Url,
    params: &[EncodedPair],
    oauth: &[(SmolStr, String)],
) -> String {
    format!(
        "{}&{}&{}",
        method.as_str().to_ascii_uppercase(),
        encode(&normalize_url(url)),
        encode(&normalize_params(params, oauth))
    )
}

/// `enc(consumer_secret)&enc(token_secret)`.
pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        encode(consumer_secret),
        encode(token_secret.unwrap_or_default())
    )
}

/// Sign `base_string` with `key`.
pub fn sign(method: SignatureMethod, base_string: &str, key: &str) -> Result<String> {
    match method {
        SignatureMethod::Plaintext => Ok(key.to_string()),
        SignatureMethod::HmacSha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
                .map_err(|e| OAuthError::Signing(e.to_string()))?;
            mac.update(base_string.as_bytes());
            Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
        }
    }
}

/// A computed signature with the base string it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Signature base string
    pub base_string: String,
    /// `oauth_signature`
    pub value: String,
}

/// Sign one request. Deterministic given identical inputs.
pub fn sign_request(
    method: &Method,
    url: &Url,
    params: &[EncodedPair],
    oauth: &OAuthParams,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<Signature> {
    let base_string = base_string(method, url, params, &oauth.pairs());
    let key = signing_key(consumer_secret, token_secret);
    let value = sign(oauth.signature_method, &base_string, &key)?;
    Ok(Signature { base_string, value })
}

/// `realm="..", oauth_consumer_key="..", ..., oauth_signature=".."`, the credentials part
/// of an `OAuth` authorization header.
pub fn header_credentials(realm: Option<&str>, oauth: &OAuthParams, signature: &str) -> String {
    let mut parts = Vec::new();
    if let Some(realm) = realm {
        parts.push(format!("realm=\"{}\"", realm.replace('"', "\\\"")));
    }
    for (name, value) in oauth.pairs() {
        parts.push(format!("{}=\"{}\"", encode(&name), encode(&value)));
    }
    parts.push(format!("oauth_signature=\"{}\"", encode(signature)));
    parts.join(", ")
}
