// sentinel/core/transfer/src/bandwidth.rs

use crate::error::TransferError;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BandwidthConfig {
    /// Bytes each peer may move per UTC day
    pub daily_limit: u64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            daily_limit: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DayUsage {
    day: NaiveDate,
    bytes: u64,
}

/// Per-peer daily transfer accounting.
///
/// Counters reset lazily when a peer's recorded day is no longer the
/// current UTC date.
pub struct BandwidthTracker {
    daily_limit: u64,
    usage: Mutex<HashMap<String, DayUsage>>,
}

impl BandwidthTracker {
    pub fn new(config: BandwidthConfig) -> Self {
        Self {
            daily_limit: config.daily_limit,
            usage: Mutex::new(HashMap::new()),
        }
    }

    fn bytes_today(usage: &HashMap<String, DayUsage>, peer: &str, today: NaiveDate) -> u64 {
        match usage.get(peer) {
            Some(entry) if entry.day == today => entry.bytes,
            _ => 0,
        }
    }

    /// Reject when serving `bytes` would push the peer past its daily cap.
    pub fn check(&self, peer: &str, bytes: u64) -> Result<(), TransferError> {
        let today = Utc::now().date_naive();
        let usage = self.usage.lock();
        if Self::bytes_today(&usage, peer, today).saturating_add(bytes) > self.daily_limit {
            return Err(TransferError::QuotaExceeded);
        }
        Ok(())
    }

    /// Record `bytes` against the peer's counter for today.
    pub fn charge(&self, peer: &str, bytes: u64) {
        let today = Utc::now().date_naive();
        let mut usage = self.usage.lock();
        let current = Self::bytes_today(&usage, peer, today);
        usage.insert(
            peer.to_string(),
            DayUsage {
                day: today,
                bytes: current.saturating_add(bytes),
            },
        );
    }

    pub fn used_today(&self, peer: &str) -> u64 {
        let today = Utc::now().date_naive();
        Self::bytes_today(&self.usage.lock(), peer, today)
    }

    /// Truncated usage snapshot for the stats endpoint, keyed by an
    /// abbreviated pubkey.
    pub fn snapshot(&self, limit: usize) -> HashMap<String, u64> {
        let today = Utc::now().date_naive();
        self.usage
            .lock()
            .iter()
            .filter(|(_, entry)| entry.day == today)
            .take(limit)
            .map(|(peer, entry)| {
                let label = if peer.len() > 8 {
                    format!("{}...", &peer[..8])
                } else {
                    peer.clone()
                };
                (label, entry.bytes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_accumulates() {
        let tracker = BandwidthTracker::new(BandwidthConfig { daily_limit: 100 });
        tracker.charge("pk", 30);
        tracker.charge("pk", 20);
        assert_eq!(tracker.used_today("pk"), 50);
    }

    #[test]
    fn test_check_rejects_past_cap() {
        let tracker = BandwidthTracker::new(BandwidthConfig { daily_limit: 100 });
        tracker.charge("pk", 90);
        assert!(tracker.check("pk", 10).is_ok());
        assert!(matches!(
            tracker.check("pk", 11),
            Err(TransferError::QuotaExceeded)
        ));
    }

    #[test]
    fn test_peers_are_independent() {
        let tracker = BandwidthTracker::new(BandwidthConfig { daily_limit: 100 });
        tracker.charge("pk-a", 100);
        assert!(tracker.check("pk-b", 100).is_ok());
    }

    #[test]
    fn test_snapshot_abbreviates_pubkeys() {
        let tracker = BandwidthTracker::new(BandwidthConfig::default());
        tracker.charge("aabbccddeeff0011", 7);
        let snapshot = tracker.snapshot(10);
        assert_eq!(snapshot.get("aabbccdd..."), Some(&7));
    }
}
