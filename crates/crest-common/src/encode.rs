use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

use crate::charset::Charset;
use crate::error::EncodeError;
use crate::param::{EncodedPair, Param};

/// Everything except the RFC 3986 unreserved characters gets percent-encoded.
pub const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode `text` after transcoding it to `charset`.
pub fn percent_encode(text: &str, charset: Charset) -> Result<String, EncodeError> {
    let bytes = charset.encode(text)?;
    Ok(percent_encoding::percent_encode(&bytes, UNRESERVED).to_string())
}

/// Serialize every bound value of `params`.
///
/// A parameter without a list separator yields one pair per value, all sharing its name
/// and in value order. With a separator, all values are joined into a single pair, and a
/// parameter with no values yields nothing. Header and cookie pairs are always marked as
/// already encoded.
pub fn encode_params(params: &[Param], charset: Charset) -> Result<Vec<EncodedPair>, EncodeError> {
    let mut pairs = Vec::with_capacity(params.len());
    for param in params {
        encode_param(param, charset, &mut pairs)?;
    }
    Ok(pairs)
}

fn encode_param(
    param: &Param,
    charset: Charset,
    out: &mut Vec<EncodedPair>,
) -> Result<(), EncodeError> {
    let config = param.config();
    let encoded = config.encoded || config.destination.always_encoded();
    let values = param
        .values()
        .iter()
        .map(|v| config.serialize(v, charset))
        .collect::<Result<Vec<_>, _>>()?;

    match &config.list_separator {
        Some(_) if values.is_empty() => {}
        Some(sep) => out.push(EncodedPair::new(
            config.name.clone(),
            values.join(sep.as_str()),
            encoded,
        )),
        None => out.extend(
            values
                .into_iter()
                .map(|value| EncodedPair::new(config.name.clone(), value, encoded)),
        ),
    }
    Ok(())
}

fn encode_component(text: &str, encoded: bool, charset: Charset) -> Result<String, EncodeError> {
    if encoded {
        Ok(text.to_string())
    } else {
        percent_encode(text, charset)
    }
}

fn join_pairs(
    pairs: &[EncodedPair],
    charset: Charset,
    prefix: &str,
    separator: &str,
) -> Result<String, EncodeError> {
    let mut out = String::new();
    for (i, pair) in pairs.iter().enumerate() {
        out.push_str(if i == 0 { prefix } else { separator });
        out.push_str(&encode_component(&pair.name, pair.encoded, charset)?);
        out.push('=');
        out.push_str(&encode_component(&pair.value, pair.encoded, charset)?);
    }
    Ok(out)
}

/// `name=value&name=value`, percent-encoding every pair not marked as encoded.
///
/// Also the body of `application/x-www-form-urlencoded` entities.
pub fn to_query_string(pairs: &[EncodedPair], charset: Charset) -> Result<String, EncodeError> {
    join_pairs(pairs, charset, "", "&")
}

/// `;name=value;name=value`, ready to append to a path.
pub fn to_matrix_string(pairs: &[EncodedPair], charset: Charset) -> Result<String, EncodeError> {
    join_pairs(pairs, charset, ";", ";")
}

/// `name=value; name=value`, or `None` without pairs.
pub fn to_cookie_header(pairs: &[EncodedPair]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}
