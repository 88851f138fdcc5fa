// sentinel/core/transfer/src/replay.rs

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One observed request identity.
type ReplayKey = (String, i64, String);

/// Cache of recently seen (pubkey, timestamp, signature) triples.
///
/// Entries expire after the replay window, which bounds the cache to the
/// set of requests that could still pass the freshness check anyway.
pub struct ReplayCache {
    entries: DashMap<ReplayKey, Instant>,
    ttl: Duration,
}

impl ReplayCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn key(pubkey: &str, declared_ts: i64, signature: &str) -> ReplayKey {
        (pubkey.to_string(), declared_ts, signature.to_string())
    }

    /// Whether this triple has been seen within the replay window.
    pub fn contains(&self, pubkey: &str, declared_ts: i64, signature: &str) -> bool {
        let key = Self::key(pubkey, declared_ts, signature);
        match self.entries.get(&key) {
            Some(seen) if seen.elapsed() < self.ttl => true,
            Some(_) => {
                drop(self.entries.remove(&key));
                false
            }
            None => false,
        }
    }

    /// Record a triple. Returns false if a live entry was already present,
    /// which resolves two identical requests racing past the lookup: only
    /// one insert wins.
    pub fn insert(&self, pubkey: &str, declared_ts: i64, signature: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        let key = Self::key(pubkey, declared_ts, signature);
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() >= self.ttl {
                    occupied.insert(Instant::now());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                true
            }
        }
    }

    /// Drop expired entries.
    pub fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, seen| seen.elapsed() < self.ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "swept expired replay entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Periodic sweep so a quiet server does not hold dead entries.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep();
        }
    }
}
