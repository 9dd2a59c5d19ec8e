//! Version 2 query signing: HMAC-SHA256 over the method, host, path and the
//! sorted, RFC 3986 encoded parameter list.

use crate::types::{MwsError, Params, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;

pub const SIGNATURE_METHOD: &str = "HmacSHA256";
pub const SIGNATURE_VERSION: &str = "2";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Everything but the unreserved characters of RFC 3986.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `key=value&...` in ascending key order.
pub fn canonical_query(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, host: &str, path: &str, params: &Params) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!(
        "{}\n{}\n{}\n{}",
        method.to_uppercase(),
        host.to_lowercase(),
        path,
        canonical_query(params)
    )
}

/// Base64 encoded HMAC-SHA256 of `data`.
pub fn sign(secret: &str, data: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| MwsError::Config(format!("Unusable secret key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Adds the signature method and version to `params` and returns the full
/// query string with `Signature` appended last.
pub fn signed_query(
    method: &str,
    host: &str,
    path: &str,
    params: &mut Params,
    secret: &str,
) -> Result<String> {
    params.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
    params.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
    params.remove("Signature");

    let signature = sign(secret, &string_to_sign(method, host, path, params))?;
    Ok(format!("{}&Signature={}", canonical_query(params), encode(&signature)))
}
