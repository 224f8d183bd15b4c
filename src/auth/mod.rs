//! Authentication module
//!
//! Pluggable proxy authenticators selected once from a configuration URI:
//!
//! - `static://?username=U&password=P&hidden_domain=D`
//! - `basicfile://?path=PATH&hidden_domain=D&reload=DURATION`
//! - `cert://`
//! - `none://`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Request, Response};
use thiserror::Error;

pub mod basic;
pub mod cert;
pub mod challenge;
pub mod none;
pub mod store;

pub use basic::BasicAuth;
pub use cert::{CertAuth, PeerCertificate, TlsInfo};
pub use none::NoAuth;

/// Authenticator construction errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid auth config URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("Unknown auth scheme: {0}")]
    UnknownScheme(String),

    #[error("\"{0}\" parameter is missing from auth config URI")]
    MissingParameter(&'static str),

    #[error("Failed to hash static password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Unable to load initial password list: {0}")]
    InitialLoad(#[source] store::StoreError),

    #[error("Periodic credential reload requires a Tokio runtime")]
    NoRuntime,
}

/// Per-request inputs consumed by authenticators
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// host[:port] of the request target (absolute URI or CONNECT authority)
    pub target_host: String,
    /// Literal `Host` header
    pub host: String,
    /// Raw `Proxy-Authorization` header value
    pub proxy_authorization: Option<String>,
    /// Verified TLS state, when the client connected over TLS
    pub tls: Option<TlsInfo>,
}

impl AuthRequest {
    /// Extract the authentication inputs from an inbound proxy request
    pub fn from_http<B>(req: &Request<B>) -> Self {
        let uri = req.uri();
        let target_host = match (uri.host(), uri.port_u16()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        };

        let header_str = |name: header::HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            target_host,
            host: header_str(header::HOST).unwrap_or_default(),
            proxy_authorization: header_str(header::PROXY_AUTHORIZATION),
            tls: None,
        }
    }

    /// Attach verified TLS state from the listener
    #[must_use]
    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// Outcome of validating a request
#[derive(Debug)]
pub enum Verdict {
    /// Access granted under `identity` (empty for anonymous access)
    Granted { identity: String },
    /// Access refused; the response must be sent to the client as-is
    Denied(Response<Full<Bytes>>),
}

impl Verdict {
    /// Authenticated identity, empty unless granted
    pub fn identity(&self) -> &str {
        match self {
            Self::Granted { identity } => identity,
            Self::Denied(_) => "",
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    /// The response to write back, if the request was refused
    pub fn response(&self) -> Option<&Response<Full<Bytes>>> {
        match self {
            Self::Granted { .. } => None,
            Self::Denied(response) => Some(response),
        }
    }

    pub fn into_response(self) -> Option<Response<Full<Bytes>>> {
        match self {
            Self::Granted { .. } => None,
            Self::Denied(response) => Some(response),
        }
    }
}

/// Authenticator trait
pub trait Authenticator: Send + Sync {
    /// Decide whether a request may be proxied and under which identity
    fn validate(&self, request: &AuthRequest) -> Verdict;

    /// Release background resources. Safe to call more than once.
    fn stop(&self);
}

/// Build an authenticator from its configuration URI
pub fn new_auth(uri: &str) -> Result<Box<dyn Authenticator>, AuthError> {
    let url = url::Url::parse(uri)?;

    match url.scheme().to_ascii_lowercase().as_str() {
        "static" => Ok(Box::new(BasicAuth::from_static_url(&url)?)),
        "basicfile" => Ok(Box::new(BasicAuth::from_file_url(&url)?)),
        "cert" => Ok(Box::new(CertAuth)),
        "none" => Ok(Box::new(NoAuth)),
        other => Err(AuthError::UnknownScheme(other.to_string())),
    }
}

/// First value of a query parameter, empty when absent
pub(crate) fn query_param(url: &url::Url, name: &str) -> String {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
