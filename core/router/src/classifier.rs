// sentinel/core/router/src/classifier.rs

use sentinel_primitives::{ClassificationOutcome, Diagnostic};

/// Thresholds for the classification predicate.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Error-rate threshold
    pub err_thr: f64,

    /// Absolute p95 latency threshold (ms)
    pub p95_thr: f64,

    /// Latency z-score threshold
    pub zlat_thr: f64,

    /// Error-rate z-score threshold
    pub zerr_thr: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            err_thr: 0.05,
            p95_thr: 250.0,
            zlat_thr: 4.0,
            zerr_thr: 2.0,
        }
    }
}

/// Classify one diagnostic against the thresholds.
///
/// Pure function of its inputs: any threshold crossed means malicious,
/// otherwise normal.
pub fn classify(diagnostic: &Diagnostic, config: &ClassifierConfig) -> ClassificationOutcome {
    let metrics = &diagnostic.metrics;
    let z = &diagnostic.z;

    if metrics.err_rate >= config.err_thr
        || metrics.p95 >= config.p95_thr
        || z.lat >= config.zlat_thr
        || z.err >= config.zerr_thr
    {
        ClassificationOutcome::Malicious
    } else {
        ClassificationOutcome::Normal
    }
}
