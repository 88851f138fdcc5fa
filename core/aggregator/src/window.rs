// sentinel/core/aggregator/src/window.rs

use crate::reservoir::SampleReservoir;

/// Ingest-side state of one statistical series.
///
/// Mutated under its per-key lock by `ingest`, snapshotted and reset by
/// `tick`. The EMA baselines live with the tick task, not here, so the
/// lock is held only for appends and the snapshot-and-reset.
#[derive(Debug)]
pub struct WindowState {
    samples: SampleReservoir,
    errors: u64,
    count: u64,
    last_sample: Option<String>,
    idle_ticks: u32,
}

/// Raw material copied out of a window at a tick boundary.
#[derive(Debug)]
pub struct WindowSnapshot {
    pub samples: Vec<f64>,
    pub errors: u64,
    pub count: u64,
    pub sample: Option<String>,
}

impl WindowState {
    pub fn new(reservoir_capacity: usize) -> Self {
        Self {
            samples: SampleReservoir::new(reservoir_capacity),
            errors: 0,
            count: 0,
            last_sample: None,
            idle_ticks: 0,
        }
    }

    pub fn record(&mut self, latency_ms: f64, error: bool, sample: Option<String>) {
        self.samples.push(latency_ms);
        self.count += 1;
        if error {
            self.errors += 1;
        }
        if sample.is_some() {
            self.last_sample = sample;
        }
        self.idle_ticks = 0;
    }

    /// Copy the window's raw samples out and clear them.
    ///
    /// Returns `None` when nothing was ingested since the last snapshot,
    /// bumping the idle counter instead.
    pub fn snapshot(&mut self) -> Option<WindowSnapshot> {
        if self.count == 0 {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
            return None;
        }

        let snapshot = WindowSnapshot {
            samples: self.samples.take(),
            errors: self.errors,
            count: self.count,
            sample: self.last_sample.take(),
        };
        self.errors = 0;
        self.count = 0;
        Some(snapshot)
    }

    /// Consecutive ticks this window has sat empty.
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }
}
