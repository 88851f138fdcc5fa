// sentinel/core/primitives/src/types.rs

// Core record types shared across the pipeline
use serde::{Deserialize, Serialize};

/// One RPC request observation from the access log.
///
/// Produced externally and consumed exactly once by the aggregator.
/// Deserialization is strict: unknown fields and wrong numeric types are
/// rejected at the boundary so malformed lines never reach a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryEvent {
    /// Unix timestamp (seconds) at which the request was observed
    pub ts: i64,

    /// Region the request was served from
    pub region: String,

    /// Autonomous system number of the client
    pub asn: u32,

    /// RPC method name
    pub method: String,

    /// Request latency in milliseconds
    pub latency_ms: f64,

    /// Whether the request terminated in a server error
    pub error: bool,

    /// Opaque client identifier, hashed before it leaves the aggregator
    #[serde(default)]
    pub client_fingerprint: Option<String>,
}

/// Identity of one independent statistical series.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct WindowKey {
    pub region: String,
    pub asn: u32,
    pub method: String,
}

impl WindowKey {
    pub fn of(event: &TelemetryEvent) -> Self {
        Self {
            region: event.region.clone(),
            asn: event.asn,
            method: event.method.clone(),
        }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.asn, self.method)
    }
}

/// Windowed metrics carried by a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    /// 95th-percentile latency over the window's samples (ms)
    pub p95: f64,

    /// Fraction of requests in the window that errored
    pub err_rate: f64,

    /// Number of requests observed in the window
    pub count: u64,
}

/// Deviation of the window's metrics from the rolling baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScores {
    pub lat: f64,
    pub err: f64,
}

/// One aggregation window's emission for a single key.
///
/// Immutable once emitted. Serialized as flat JSON on the broker and as one
/// newline-terminated line in rotated files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Emission timestamp (unix seconds)
    pub ts: i64,

    /// Window length in milliseconds
    pub window_ms: u64,

    pub region: String,
    pub asn: u32,
    pub method: String,

    pub metrics: WindowMetrics,
    pub z: ZScores,

    /// Salted hash of the last client fingerprint seen in the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
}

impl Diagnostic {
    pub fn key(&self) -> WindowKey {
        WindowKey {
            region: self.region.clone(),
            asn: self.asn,
            method: self.method.clone(),
        }
    }
}

/// Verdict of the classification predicate for one diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationOutcome {
    Malicious,
    Normal,
}

impl ClassificationOutcome {
    pub fn is_malicious(&self) -> bool {
        matches!(self, ClassificationOutcome::Malicious)
    }
}

/// Identity of a rotation track. Each track owns its own directory and
/// rotation period, with exactly one live file at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Malicious,
    Normal,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Malicious => "malicious",
            Track::Normal => "normal",
        }
    }
}

impl From<ClassificationOutcome> for Track {
    fn from(outcome: ClassificationOutcome) -> Self {
        match outcome {
            ClassificationOutcome::Malicious => Track::Malicious,
            ClassificationOutcome::Normal => Track::Normal,
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
