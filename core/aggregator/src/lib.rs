// sentinel/core/aggregator/src/lib.rs

// Sliding-window statistics over the telemetry stream
pub mod aggregator;
pub mod ewma;
pub mod reservoir;
pub mod window;


pub use aggregator::{Aggregator, AggregatorConfig, AggregatorStats};
pub use ewma::Ewma;
pub use reservoir::SampleReservoir;
pub use window::{WindowSnapshot, WindowState};
