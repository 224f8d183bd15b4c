//! Metrics module
//!
//! Prometheus counters for authentication decisions and credential reloads.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref AUTH_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "dumbproxy_auth_attempts_total",
        "Proxy authentication attempts",
        &["method", "outcome"]  // outcome: granted | denied | disguised
    ).unwrap();

    pub static ref CREDENTIAL_RELOADS: IntCounterVec = register_int_counter_vec!(
        "dumbproxy_credential_reloads_total",
        "Credential file reloads",
        &["status"]
    ).unwrap();
}

/// Record an authentication decision
pub fn record_auth_attempt(method: &str, outcome: &str) {
    AUTH_ATTEMPTS.with_label_values(&[method, outcome]).inc();
}

/// Record a credential file reload
pub fn record_credential_reload(success: bool) {
    let status = if success { "success" } else { "failure" };
    CREDENTIAL_RELOADS.with_label_values(&[status]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
