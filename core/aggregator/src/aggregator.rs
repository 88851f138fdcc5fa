// sentinel/core/aggregator/src/aggregator.rs

use crate::ewma::Ewma;
use crate::reservoir::percentile;
use crate::window::WindowState;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sentinel_broker::{topics, Broker};
use sentinel_primitives::{
    fingerprint_hash, Diagnostic, TelemetryEvent, WindowKey, WindowMetrics, ZScores,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Tick period in milliseconds
    pub window_ms: u64,

    /// Latency samples retained per key within one window
    pub reservoir_capacity: usize,

    /// Smoothing factor for the EMA baselines
    pub ema_alpha: f64,

    /// Deployment-local salt for fingerprint hashing
    pub salt: String,

    /// When non-empty, only these methods are aggregated
    pub methods_heavy: Vec<String>,

    /// Consecutive empty ticks after which a key's window and baseline
    /// are dropped
    pub idle_expiry_ticks: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_ms: 250,
            reservoir_capacity: 2000,
            ema_alpha: 0.1,
            salt: "change-me".to_string(),
            methods_heavy: Vec::new(),
            idle_expiry_ticks: 2400,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatorStats {
    pub events_ingested: u64,
    pub events_filtered: u64,
    pub diagnostics_emitted: u64,
    pub windows_expired: u64,
}

/// Per-key EMA baselines, owned by the tick path.
struct KeyBaseline {
    lat: Ewma,
    err: Ewma,
}

impl KeyBaseline {
    fn new(alpha: f64) -> Self {
        Self {
            lat: Ewma::new(alpha),
            err: Ewma::new(alpha),
        }
    }
}

/// Turns the unbounded telemetry stream into one diagnostic per active key
/// per tick.
///
/// `ingest` and `tick` run concurrently. Windows sit behind per-key locks
/// that are held only to append or to snapshot-and-reset, so a slow tick
/// (sorting samples, publishing) never stalls ingestion.
pub struct Aggregator {
    config: AggregatorConfig,
    broker: Arc<Broker>,
    windows: DashMap<WindowKey, Mutex<WindowState>>,
    baselines: Mutex<HashMap<WindowKey, KeyBaseline>>,
    stats: RwLock<AggregatorStats>,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig, broker: Arc<Broker>) -> Self {
        Self {
            config,
            broker,
            windows: DashMap::new(),
            baselines: Mutex::new(HashMap::new()),
            stats: RwLock::new(AggregatorStats::default()),
        }
    }

    /// Record one telemetry event into its key's open window.
    ///
    /// Late-arriving events are attributed to whichever window is currently
    /// open for their key; they are not matched back to the window their
    /// timestamp names.
    pub fn ingest(&self, event: TelemetryEvent) {
        if !self.config.methods_heavy.is_empty()
            && !self.config.methods_heavy.iter().any(|m| m == &event.method)
        {
            self.stats.write().events_filtered += 1;
            return;
        }

        let sample = event
            .client_fingerprint
            .as_deref()
            .map(|fp| fingerprint_hash(fp, &self.config.salt));
        let key = WindowKey::of(&event);

        let entry = self
            .windows
            .entry(key)
            .or_insert_with(|| Mutex::new(WindowState::new(self.config.reservoir_capacity)));
        entry.lock().record(event.latency_ms, event.error, sample);
        drop(entry);

        self.stats.write().events_ingested += 1;
    }

    /// Emit one diagnostic per key with traffic since the last tick.
    ///
    /// Snapshots each active window inside its per-key critical section,
    /// then computes percentiles and z-scores and publishes outside it.
    /// Keys idle past the expiry threshold are dropped with their baseline.
    pub fn tick(&self) -> Vec<Diagnostic> {
        let ts = now_unix();
        let mut baselines = self.baselines.lock();
        let mut emitted = Vec::new();
        let mut idle = Vec::new();

        for entry in self.windows.iter() {
            let key = entry.key().clone();
            let snapshot = {
                let mut window = entry.value().lock();
                let snapshot = window.snapshot();
                if snapshot.is_none() && window.idle_ticks() >= self.config.idle_expiry_ticks {
                    idle.push(key.clone());
                }
                snapshot
            };

            let Some(snapshot) = snapshot else { continue };

            let p95 = percentile(&snapshot.samples, 95.0);
            let err_rate = snapshot.errors as f64 / snapshot.count as f64;

            let baseline = baselines
                .entry(key.clone())
                .or_insert_with(|| KeyBaseline::new(self.config.ema_alpha));
            let z_lat = baseline.lat.z(p95);
            let z_err = baseline.err.z(err_rate);
            baseline.lat.update(p95);
            baseline.err.update(err_rate);

            let diagnostic = Diagnostic {
                ts,
                window_ms: self.config.window_ms,
                region: key.region,
                asn: key.asn,
                method: key.method,
                metrics: WindowMetrics {
                    p95: round_to(p95, 2),
                    err_rate: round_to(err_rate, 4),
                    count: snapshot.count,
                },
                z: ZScores {
                    lat: round_to(z_lat, 2),
                    err: round_to(z_err, 2),
                },
                sample: snapshot.sample,
            };

            if let Err(e) = self.broker.publish_json(topics::DIAG, &diagnostic) {
                warn!(error = %e, "failed to encode diagnostic");
            }
            emitted.push(diagnostic);
        }

        for key in idle {
            let removed = self
                .windows
                .remove_if(&key, |_, window| {
                    window.lock().idle_ticks() >= self.config.idle_expiry_ticks
                })
                .is_some();
            if removed {
                baselines.remove(&key);
                self.stats.write().windows_expired += 1;
                debug!(key = %key, "expired idle window");
            }
        }

        if !emitted.is_empty() {
            self.stats.write().diagnostics_emitted += emitted.len() as u64;
        }
        emitted
    }

    /// Drive `tick` on the configured wall-clock period.
    pub async fn run(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.window_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let emitted = self.tick();
            if !emitted.is_empty() {
                debug!(count = emitted.len(), "tick emitted diagnostics");
            }
        }
    }

    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn stats(&self) -> AggregatorStats {
        *self.stats.read()
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn round_to(x: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (x * factor).round() / factor
}
