//! Credential extraction and API-key signatures

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;

use crate::types::{ClientInfo, IsRequestAllowedRequest};

pub const X_SESSION_TOKEN: &str = "x-session-token";
pub const X_API_KEYID: &str = "x-api-keyid";
pub const X_API_TOKEN: &str = "x-api-token";
pub const X_ORGANIZATION: &str = "x-organization";
pub const X_PROJECT: &str = "x-project";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Cookie carrying the identity provider's session.
pub const SESSION_COOKIE: &str = "ory_kratos_session";

/// The authentication path a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    ApiKey { id: &'a str, signature: &'a str },
    Session { token: &'a str, cookie: &'a str },
}

impl<'a> Credentials<'a> {
    /// An API key id takes precedence over any session token or cookie.
    pub fn from_request(req: &'a IsRequestAllowedRequest) -> Self {
        if !req.api_key.is_empty() {
            Credentials::ApiKey {
                id: &req.api_key,
                signature: &req.api_token,
            }
        } else {
            Credentials::Session {
                token: &req.session_token,
                cookie: &req.cookie,
            }
        }
    }
}

/// Signature expected for an API key secret: base64 of its MD5 digest.
pub fn checksum(secret: &str) -> String {
    STANDARD.encode(md5::compute(secret.as_bytes()).0)
}

/// Compare a presented signature with the secret's checksum in constant time.
pub fn signature_matches(presented: &str, secret: &str) -> bool {
    let expected = checksum(secret);
    presented.len() == expected.len() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

/// Value of the named cookie in a `Cookie` header.
pub fn read_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
    })
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Client metadata harvested from transport headers.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let forwarded = header_str(headers, X_FORWARDED_FOR);
    ClientInfo {
        // First hop is the originating client.
        ip: forwarded.split(',').next().unwrap_or_default().trim().to_string(),
        host: header_str(headers, header::HOST),
        user_agent: header_str(headers, header::USER_AGENT),
    }
}

/// Build a pipeline request from HTTP headers.
///
/// Only the session cookie is forwarded to the identity provider; other
/// cookies on the request stay local.
pub fn request_from_headers(headers: &HeaderMap, url: &str, method: &str) -> IsRequestAllowedRequest {
    let cookie = read_cookie(&header_str(headers, header::COOKIE), SESSION_COOKIE)
        .map(|value| format!("{SESSION_COOKIE}={value}"))
        .unwrap_or_default();

    IsRequestAllowedRequest {
        url: url.to_string(),
        method: method.to_string(),
        full_method: String::new(),
        session_token: header_str(headers, X_SESSION_TOKEN),
        cookie,
        api_key: header_str(headers, X_API_KEYID),
        api_token: header_str(headers, X_API_TOKEN),
        org: header_str(headers, X_ORGANIZATION),
        project: header_str(headers, X_PROJECT),
        no_authz: false,
        client: client_info(headers),
    }
}
