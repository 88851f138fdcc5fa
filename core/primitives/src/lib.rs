// sentinel/core/primitives/src/lib.rs

// Shared data model for the telemetry pipeline and the peer log exchange
pub mod fingerprint;
pub mod types;

pub use fingerprint::fingerprint_hash;
pub use types::{
    ClassificationOutcome, Diagnostic, TelemetryEvent, Track, WindowKey, WindowMetrics, ZScores,
};
