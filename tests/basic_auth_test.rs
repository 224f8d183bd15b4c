//! Basic Authentication Integration Tests
//!
//! Covers the proxy challenge protocol: credential checks, malformed
//! headers and the hidden-domain decoy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use dumbproxy_auth::auth::challenge::{AUTH_REQUIRED_MSG, AUTH_TRIGGERED_MSG, EPOCH_EXPIRE};
use dumbproxy_auth::auth::{AuthRequest, Authenticator, BasicAuth, Verdict};
use http_body_util::BodyExt;
use hyper::{header, StatusCode};

// ============================================================================
// Helpers
// ============================================================================

fn basic_header(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", login, password)))
}

fn request(header: Option<&str>, host: &str) -> AuthRequest {
    AuthRequest {
        target_host: host.to_string(),
        host: host.to_string(),
        proxy_authorization: header.map(str::to_string),
        tls: None,
    }
}

fn status(verdict: &Verdict) -> Option<StatusCode> {
    verdict.response().map(|r| r.status())
}

async fn body(verdict: Verdict) -> Bytes {
    verdict
        .into_response()
        .expect("verdict should carry a response")
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
}

// ============================================================================
// TEST: Credential checks
// ============================================================================

#[test]
fn test_valid_credentials_granted() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();

    let verdict = auth.validate(&request(
        Some(&basic_header("alice", "wonderland")),
        "example.org:443",
    ));

    assert!(verdict.is_authorized());
    assert_eq!(verdict.identity(), "alice");
    assert!(verdict.response().is_none());
}

#[test]
fn test_password_may_contain_colons() {
    let auth = BasicAuth::from_static("alice", "a:b:c", "").unwrap();

    let verdict = auth.validate(&request(Some(&basic_header("alice", "a:b:c")), ""));
    assert!(verdict.is_authorized());
    assert_eq!(verdict.identity(), "alice");
}

#[tokio::test]
async fn test_wrong_password_challenged() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();

    let verdict = auth.validate(&request(Some(&basic_header("alice", "nope")), ""));

    assert!(!verdict.is_authorized());
    assert_eq!(verdict.identity(), "");
    let response = verdict.response().unwrap();
    assert_eq!(response.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
    assert_eq!(
        response.headers()[header::PROXY_AUTHENTICATE],
        r#"Basic realm="dumbproxy""#
    );
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        AUTH_REQUIRED_MSG.len().to_string().as_str()
    );
    assert_eq!(body(verdict).await, AUTH_REQUIRED_MSG.as_bytes());
}

#[test]
fn test_unknown_login_challenged() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();

    let verdict = auth.validate(&request(Some(&basic_header("bob", "wonderland")), ""));
    assert!(!verdict.is_authorized());
    assert_eq!(
        status(&verdict),
        Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
    );
}

// ============================================================================
// TEST: Malformed headers
// ============================================================================

#[test]
fn test_malformed_headers_challenged() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();
    let no_colon = format!("Basic {}", STANDARD.encode("alicewonderland"));

    let cases: Vec<Option<&str>> = vec![
        None,
        Some(""),
        Some("Basic"),
        Some("Digest abc"),
        Some("Basic %%%not-base64%%%"),
        Some(no_colon.as_str()),
        Some("Bearer YWxpY2U6d29uZGVybGFuZA=="),
    ];

    for header in cases {
        let verdict = auth.validate(&request(header, "example.org"));
        assert!(!verdict.is_authorized(), "header {:?} must be rejected", header);
        assert_eq!(verdict.identity(), "");
        assert_eq!(
            status(&verdict),
            Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED),
            "header {:?} must get the 407 challenge",
            header
        );
    }
}

#[test]
fn test_scheme_is_case_insensitive() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();
    let header = format!("bAsIc {}", STANDARD.encode("alice:wonderland"));

    assert!(auth.validate(&request(Some(&header), "")).is_authorized());
}

// ============================================================================
// TEST: Hidden domain
// ============================================================================

#[tokio::test]
async fn test_valid_credentials_on_hidden_domain_disguised() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();

    let verdict = auth.validate(&request(
        Some(&basic_header("alice", "wonderland")),
        "example.com",
    ));

    assert!(!verdict.is_authorized());
    assert_eq!(verdict.identity(), "");
    let response = verdict.response().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(response.headers()[header::EXPIRES], EPOCH_EXPIRE);
    assert!(response.headers().get(header::DATE).is_none());
    assert_eq!(body(verdict).await, AUTH_TRIGGERED_MSG.as_bytes());
}

#[test]
fn test_hidden_domain_matched_by_target_only() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();
    let req = AuthRequest {
        target_host: "example.com".into(),
        host: "proxy.local".into(),
        proxy_authorization: Some(basic_header("alice", "wonderland")),
        tls: None,
    };

    assert_eq!(status(&auth.validate(&req)), Some(StatusCode::OK));
}

#[test]
fn test_valid_credentials_elsewhere_granted_with_hidden_domain() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();

    let verdict = auth.validate(&request(
        Some(&basic_header("alice", "wonderland")),
        "other.org:443",
    ));
    assert!(verdict.is_authorized());
    assert_eq!(verdict.identity(), "alice");
}

#[tokio::test]
async fn test_invalid_credentials_elsewhere_get_bad_request() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();

    let verdict = auth.validate(&request(Some(&basic_header("alice", "nope")), "other.org"));
    assert!(!verdict.is_authorized());
    assert_eq!(status(&verdict), Some(StatusCode::BAD_REQUEST));
    assert!(verdict
        .response()
        .unwrap()
        .headers()
        .get(header::PROXY_AUTHENTICATE)
        .is_none());
    assert_eq!(body(verdict).await, "Bad Request\n");
}

#[test]
fn test_missing_header_elsewhere_gets_bad_request() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();

    let verdict = auth.validate(&request(None, "other.org"));
    assert_eq!(status(&verdict), Some(StatusCode::BAD_REQUEST));
}

#[test]
fn test_invalid_credentials_on_hidden_domain_challenged() {
    let auth = BasicAuth::from_static("alice", "wonderland", "example.com").unwrap();

    let verdict = auth.validate(&request(Some(&basic_header("alice", "nope")), "example.com"));
    assert!(!verdict.is_authorized());
    assert_eq!(
        status(&verdict),
        Some(StatusCode::PROXY_AUTHENTICATION_REQUIRED)
    );
}

#[test]
fn test_hidden_domain_config_is_case_folded() {
    let auth = BasicAuth::from_static("alice", "wonderland", "Example.COM").unwrap();
    let header = basic_header("alice", "wonderland");

    assert_eq!(
        status(&auth.validate(&request(Some(&header), "example.com"))),
        Some(StatusCode::OK)
    );
    // Request hosts are compared exactly against the folded value.
    assert!(auth
        .validate(&request(Some(&header), "EXAMPLE.COM"))
        .is_authorized());
}

// ============================================================================
// TEST: hyper request integration
// ============================================================================

#[test]
fn test_validate_from_http_request() {
    let auth = BasicAuth::from_static("alice", "wonderland", "").unwrap();
    let req = hyper::Request::builder()
        .method("CONNECT")
        .uri("example.org:443")
        .header(header::HOST, "example.org:443")
        .header(header::PROXY_AUTHORIZATION, basic_header("alice", "wonderland"))
        .body(())
        .unwrap();

    let verdict = auth.validate(&AuthRequest::from_http(&req));
    assert!(verdict.is_authorized());
    assert_eq!(verdict.identity(), "alice");
}
