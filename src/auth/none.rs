//! Anonymous access

use super::{AuthRequest, Authenticator, Verdict};

/// Authorizes every request with an empty identity
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn validate(&self, _request: &AuthRequest) -> Verdict {
        #[cfg(feature = "metrics")]
        crate::metrics::record_auth_attempt("none", "granted");

        Verdict::Granted {
            identity: String::new(),
        }
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_auth_always_grants() {
        let auth = NoAuth;
        let verdict = auth.validate(&AuthRequest::default());
        assert!(verdict.is_authorized());
        assert_eq!(verdict.identity(), "");

        auth.stop();
        auth.stop();
        assert!(auth.validate(&AuthRequest::default()).is_authorized());
    }
}
