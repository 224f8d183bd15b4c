//! Proxy authentication challenge responses
//!
//! Canned responses written back to the client when a request is rejected
//! or when valid credentials hit the hidden domain.

use super::AuthRequest;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use subtle::ConstantTimeEq;

/// Body of the 407 challenge, styled as a stock nginx welcome page
pub const AUTH_REQUIRED_MSG: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Welcome to nginx!</title>
<style>
    body {
        width: 35em;
        margin: 0 auto;
        font-family: Tahoma, Verdana, Arial, sans-serif;
    }
</style>
</head>
<body>
<h1>Welcome to nginx!</h1>
<p>If you see this page, the nginx web server is successfully installed and
working. Further configuration is required.</p>
<p>For online documentation and support please refer to
<a href="http://nginx.org/">nginx.org</a>.<br/>
Commercial support is available at
<a href="http://nginx.com/">nginx.com</a>.</p>
<p><em>Thank you for using nginx.</em></p>
</body>
</html>"#;

pub const BAD_REQ_MSG: &str = "Bad Request\n";

pub const AUTH_TRIGGERED_MSG: &str = "Browser auth triggered!\n";

pub const EPOCH_EXPIRE: &str = "Thu, 01 Jan 1970 00:00:01 GMT";

pub const REALM: &str = r#"Basic realm="dumbproxy""#;

/// Response body type shared by all canned responses
pub type Body = Full<Bytes>;

/// Response extension asking the server loop not to emit a `Date` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressDate;

/// Whether the request addresses `hidden_domain` via its target or `Host` header.
///
/// Both sides are compared in constant time; an empty hidden domain never matches.
pub fn addresses_hidden_domain(request: &AuthRequest, hidden_domain: &str) -> bool {
    if hidden_domain.is_empty() {
        return false;
    }
    let target: bool = request
        .target_host
        .as_bytes()
        .ct_eq(hidden_domain.as_bytes())
        .into();
    let host: bool = request.host.as_bytes().ct_eq(hidden_domain.as_bytes()).into();
    target | host
}

/// Reject an unauthenticated request.
///
/// With a hidden domain configured, clients not addressing it get a plain
/// 400 so the decoy stays invisible; everyone else gets the 407 challenge.
pub fn require_auth(request: &AuthRequest, hidden_domain: &str) -> Response<Body> {
    if !hidden_domain.is_empty() && !addresses_hidden_domain(request, hidden_domain) {
        return bad_request();
    }
    proxy_auth_required()
}

/// 407 with a `Proxy-Authenticate` challenge
pub fn proxy_auth_required() -> Response<Body> {
    let mut response = fixed_body(AUTH_REQUIRED_MSG);
    *response.status_mut() = StatusCode::PROXY_AUTHENTICATION_REQUIRED;
    response.headers_mut().insert(
        header::PROXY_AUTHENTICATE,
        HeaderValue::from_static(REALM),
    );
    response
}

/// Generic 400
pub fn bad_request() -> Response<Body> {
    let mut response = fixed_body(BAD_REQ_MSG);
    *response.status_mut() = StatusCode::BAD_REQUEST;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Uncacheable 200 shown when valid credentials reach the hidden domain
pub fn auth_triggered() -> Response<Body> {
    let mut response = fixed_body(AUTH_TRIGGERED_MSG);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::EXPIRES, HeaderValue::from_static(EPOCH_EXPIRE));
    headers.remove(header::DATE);
    response.extensions_mut().insert(SuppressDate);
    response
}

fn fixed_body(body: &'static str) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    response
}
