// Metrics module - Prometheus counters for authentication outcomes
//
// Counters live in the default prometheus registry so a host service exposes
// them with its own /metrics handler (see `render`).

use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::OnceLock;

/// Global authentication metrics
pub struct AuthMetrics {
    /// Gate outcomes by label: authorized, bypassed, missing, invalid,
    /// expired, key_resolution, scope_encoding, denied, api_key_missing,
    /// api_key_invalid
    pub outcomes: IntCounterVec,

    /// JWKS fetches by result: success, failure
    pub jwks_fetches: IntCounterVec,
}

static METRICS: OnceLock<AuthMetrics> = OnceLock::new();

impl AuthMetrics {
    /// Initialize and return the global metrics instance
    ///
    /// Subsequent calls return the same instance.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let outcomes = register_int_counter_vec!(
                "authgate_auth_outcomes_total",
                "Total number of authentication and authorization outcomes",
                &["outcome"]
            )
            .expect("Failed to register authgate_auth_outcomes_total metric");

            let jwks_fetches = register_int_counter_vec!(
                "authgate_jwks_fetches_total",
                "Total number of remote JWKS fetches by result",
                &["result"]
            )
            .expect("Failed to register authgate_jwks_fetches_total metric");

            AuthMetrics {
                outcomes,
                jwks_fetches,
            }
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn record_jwks_fetch(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.jwks_fetches.with_label_values(&[result]).inc();
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.outcomes.with_label_values(&[outcome]).get()
    }

    pub fn jwks_fetch_count(&self, success: bool) -> u64 {
        let result = if success { "success" } else { "failure" };
        self.jwks_fetches.with_label_values(&[result]).get()
    }
}

/// Render every metric in the default registry in the Prometheus text format
pub fn render() -> String {
    // Touch the counters so they appear even before the first event.
    let _ = AuthMetrics::global();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
