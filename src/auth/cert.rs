//! TLS client certificate authentication
//!
//! Certificate validation happens in the TLS layer; this authenticator only
//! reads the verified chains it hands over.

use super::{challenge, AuthRequest, Authenticator, Verdict};
use tracing::debug;

/// A certificate from a verified chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Subject distinguished name as rendered by the TLS layer
    pub subject: String,
}

impl PeerCertificate {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

/// Verified TLS state for a client connection
#[derive(Debug, Clone, Default)]
pub struct TlsInfo {
    /// Verified chains, leaf certificate first
    pub verified_chains: Vec<Vec<PeerCertificate>>,
}

impl TlsInfo {
    /// Leaf certificate of the first verified chain
    pub fn leaf(&self) -> Option<&PeerCertificate> {
        self.verified_chains.first().and_then(|chain| chain.first())
    }
}

/// Identity from the client certificate subject
#[derive(Debug, Clone, Copy, Default)]
pub struct CertAuth;

impl Authenticator for CertAuth {
    fn validate(&self, request: &AuthRequest) -> Verdict {
        match request.tls.as_ref().and_then(TlsInfo::leaf) {
            Some(leaf) => {
                #[cfg(feature = "metrics")]
                crate::metrics::record_auth_attempt("cert", "granted");

                Verdict::Granted {
                    identity: leaf.subject.clone(),
                }
            }
            None => {
                debug!("no verified client certificate chain");
                #[cfg(feature = "metrics")]
                crate::metrics::record_auth_attempt("cert", "denied");

                Verdict::Denied(challenge::bad_request())
            }
        }
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;

    #[test]
    fn test_missing_tls_is_bad_request() {
        let verdict = CertAuth.validate(&AuthRequest::default());
        assert!(!verdict.is_authorized());
        assert_eq!(verdict.response().unwrap().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_empty_chains_are_rejected() {
        let request = AuthRequest::default().with_tls(TlsInfo {
            verified_chains: vec![vec![]],
        });
        let verdict = CertAuth.validate(&request);
        assert!(!verdict.is_authorized());
        assert_eq!(verdict.identity(), "");
    }

    #[test]
    fn test_leaf_subject_is_identity() {
        let request = AuthRequest::default().with_tls(TlsInfo {
            verified_chains: vec![
                vec![
                    PeerCertificate::new("CN=alice,O=Example"),
                    PeerCertificate::new("CN=Example CA"),
                ],
                vec![PeerCertificate::new("CN=other")],
            ],
        });
        let verdict = CertAuth.validate(&request);
        assert!(verdict.is_authorized());
        assert_eq!(verdict.identity(), "CN=alice,O=Example");
    }
}
