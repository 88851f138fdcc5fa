// sentinel/core/transfer/src/auth.rs

use crate::error::TransferError;
use crate::replay::ReplayCache;
use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signed request identity carried in the auth headers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Hex-encoded ed25519 verifying key
    pub peer_pubkey: String,

    /// Unix timestamp the requester claims to have signed at
    pub declared_ts: i64,

    /// Hex-encoded ed25519 signature over the canonical message
    pub signature: String,
}

impl AuthContext {
    /// Canonical message a peer signs: target id, declared timestamp and
    /// its own pubkey, concatenated without separators. The target is the
    /// filename for uploads and the log id for downloads.
    pub fn canonical_message(target: &str, declared_ts: i64, peer_pubkey: &str) -> Vec<u8> {
        format!("{target}{declared_ts}{peer_pubkey}").into_bytes()
    }
}

/// Set of peers allowed to upload and download, keyed by hex pubkey.
///
/// The backing file is maintained by an external process that mirrors the
/// on-chain membership; one pubkey per line, `#` for comments.
pub struct AuthorizedPeers {
    path: Option<PathBuf>,
    peers: RwLock<HashSet<String>>,
}

impl AuthorizedPeers {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            peers: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the set from the backing file. On read failure the previous
    /// snapshot is kept.
    pub fn reload(&self) -> std::io::Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.peers.read().len());
        };

        let content = std::fs::read_to_string(path)?;
        let fresh: HashSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        let count = fresh.len();
        *self.peers.write() = fresh;
        Ok(count)
    }

    pub fn contains(&self, pubkey: &str) -> bool {
        self.peers.read().contains(pubkey)
    }

    /// Add one peer directly, bypassing the backing file.
    pub fn insert(&self, pubkey: impl Into<String>) {
        self.peers.write().insert(pubkey.into());
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Periodically re-read the backing file.
    pub async fn run_refresh(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.reload() {
                Ok(count) => debug!(count, "refreshed authorized peers"),
                Err(e) => warn!(error = %e, "failed to refresh authorized peers, keeping previous set"),
            }
        }
    }
}

/// Request authentication for uploads and downloads.
pub struct Authenticator {
    peers: Arc<AuthorizedPeers>,
    replay: Arc<ReplayCache>,
    replay_window: Duration,
    disable_signature_check: bool,
}

impl Authenticator {
    pub fn new(
        peers: Arc<AuthorizedPeers>,
        replay: Arc<ReplayCache>,
        replay_window: Duration,
        disable_signature_check: bool,
    ) -> Self {
        if disable_signature_check {
            info!("signature verification DISABLED; authorization, freshness and replay checks still apply");
        }
        Self {
            peers,
            replay,
            replay_window,
            disable_signature_check,
        }
    }

    /// Run the authentication protocol in its fixed order, cheap checks
    /// before the signature:
    ///
    /// 1. pubkey is in the authorized set
    /// 2. declared timestamp is within the replay window of `now`
    /// 3. the (pubkey, timestamp, signature) triple has not been seen
    /// 4. the signature verifies over the canonical message
    ///
    /// The triple is recorded only after every step passes. Two identical
    /// requests racing each other resolve at the final insert: the loser
    /// fails as a replay even though it verified.
    pub fn verify(
        &self,
        target: &str,
        auth: &AuthContext,
        now: i64,
    ) -> Result<(), TransferError> {
        if !self.peers.contains(&auth.peer_pubkey) {
            return Err(TransferError::Unauthorized);
        }

        if (now - auth.declared_ts).abs() as u64 > self.replay_window.as_secs() {
            return Err(TransferError::StaleRequest);
        }

        if self
            .replay
            .contains(&auth.peer_pubkey, auth.declared_ts, &auth.signature)
        {
            return Err(TransferError::ReplayDetected);
        }

        if !self.disable_signature_check {
            verify_signature(target, auth)?;
        }

        if !self
            .replay
            .insert(&auth.peer_pubkey, auth.declared_ts, &auth.signature)
        {
            return Err(TransferError::ReplayDetected);
        }

        Ok(())
    }
}

fn verify_signature(target: &str, auth: &AuthContext) -> Result<(), TransferError> {
    let key_bytes: [u8; 32] = hex::decode(&auth.peer_pubkey)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(TransferError::InvalidSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| TransferError::InvalidSignature)?;

    let sig_bytes: [u8; 64] = hex::decode(&auth.signature)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(TransferError::InvalidSignature)?;
    let signature = DalekSignature::from_bytes(&sig_bytes);

    let message = AuthContext::canonical_message(target, auth.declared_ts, &auth.peer_pubkey);
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| TransferError::InvalidSignature)
}
