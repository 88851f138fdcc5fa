// sentinel/core/router/src/lib.rs

// Classification of diagnostics and rotation of the track files they land in
pub mod classifier;
pub mod rotation;
pub mod router;

#[cfg(test)]
mod rotation_tests;

pub use classifier::{classify, ClassifierConfig};
pub use rotation::{spawn_track, RotationConfig, RouterError, TrackHandle, TrackWriter};
pub use router::{spawn_router, RouterHandles};
