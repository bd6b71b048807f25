//! HMAC-SHA1 request signing (RFC 5849).
//!
//! The signature covers the method, the base URL and every query and
//! `oauth_*` parameter; JSON bodies are not part of it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha1::Sha1;

use super::Token;
use crate::transport::{HttpRequest, Method};
use crate::types::ConsumerCredentials;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// `METHOD&enc(url)&enc(sorted, encoded params)`.
pub fn signature_base_string(method: Method, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

/// Base64 HMAC-SHA1 of the base string, keyed by `enc(consumer)&enc(token)`.
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: Option<&str>) -> String {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or(""))
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base_string.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the `Authorization: OAuth ...` header value for a request with a
/// fixed nonce and timestamp.
///
/// `extra` carries handshake-only protocol parameters such as
/// `oauth_callback` and `oauth_verifier`.
pub fn authorization_header(
    request: &HttpRequest,
    consumer: &ConsumerCredentials,
    token: Option<&Token>,
    extra: &[(&str, &str)],
    nonce: &str,
    timestamp: u64,
) -> String {
    let mut oauth: Vec<(String, String)> = vec![
        ("oauth_consumer_key".into(), consumer.key.clone()),
        ("oauth_nonce".into(), nonce.to_string()),
        ("oauth_signature_method".into(), SIGNATURE_METHOD.into()),
        ("oauth_timestamp".into(), timestamp.to_string()),
        ("oauth_version".into(), VERSION.into()),
    ];
    if let Some(t) = token {
        oauth.push(("oauth_token".into(), t.token.clone()));
    }
    for (k, v) in extra {
        oauth.push(((*k).to_string(), (*v).to_string()));
    }

    let mut params = request.query.clone();
    params.extend(oauth.iter().cloned());
    let base = signature_base_string(request.method, &request.url, &params);
    let signature = sign(&base, &consumer.secret, token.map(|t| t.secret.as_str()));

    oauth.push(("oauth_signature".into(), signature));
    oauth.sort();

    let fields = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

/// Sign a request with a fresh nonce and the current time.
pub fn authorize(
    request: HttpRequest,
    consumer: &ConsumerCredentials,
    token: Option<&Token>,
    extra: &[(&str, &str)],
) -> HttpRequest {
    let header = authorization_header(
        &request,
        consumer,
        token,
        extra,
        &nonce(),
        current_timestamp_secs(),
    );
    request.header("Authorization", header)
}

fn nonce() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Current timestamp in seconds.
fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
