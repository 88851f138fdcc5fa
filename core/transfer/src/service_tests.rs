// sentinel/core/transfer/src/service_tests.rs

use crate::auth::{AuthContext, Authenticator, AuthorizedPeers};
use crate::error::TransferError;
use crate::ledger::{LedgerClient, LedgerConfig};
use crate::replay::ReplayCache;
use crate::server::{TransferConfig, TransferService};
use crate::store::StoreConfig;
use crate::BandwidthConfig;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

fn create_test_key() -> (SigningKey, String) {
    let signing_key = SigningKey::from_bytes(&rand::random());
    let pubkey_hex = hex::encode(signing_key.verifying_key().to_bytes());
    (signing_key, pubkey_hex)
}

fn sign_request(key: &SigningKey, pubkey_hex: &str, target: &str, declared_ts: i64) -> AuthContext {
    let message = AuthContext::canonical_message(target, declared_ts, pubkey_hex);
    AuthContext {
        peer_pubkey: pubkey_hex.to_string(),
        declared_ts,
        signature: hex::encode(key.sign(&message).to_bytes()),
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn create_test_service(
    dir: &std::path::Path,
    mutate: impl FnOnce(&mut TransferConfig),
) -> Arc<TransferService> {
    let mut config = TransferConfig {
        store: StoreConfig {
            dir: dir.to_path_buf(),
            ..StoreConfig::default()
        },
        ..TransferConfig::default()
    };
    mutate(&mut config);

    let ledger = LedgerClient::new(LedgerConfig::default()).unwrap();
    TransferService::new(config, ledger).unwrap()
}

mod auth_protocol {
    use super::*;

    fn create_test_authenticator(
        pubkey_hex: &str,
        disable_signature_check: bool,
    ) -> Authenticator {
        let peers = Arc::new(AuthorizedPeers::new(None));
        peers.insert(pubkey_hex);
        let replay = Arc::new(ReplayCache::new(Duration::from_secs(300)));
        Authenticator::new(
            peers,
            replay,
            Duration::from_secs(300),
            disable_signature_check,
        )
    }

    #[test]
    fn test_valid_request_passes() {
        let (key, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);
        let auth = sign_request(&key, &pubkey, "attack.log", 1000);
        assert!(authenticator.verify("attack.log", &auth, 1000).is_ok());
    }

    #[test]
    fn test_unknown_peer_rejected_first() {
        let (key, pubkey) = create_test_key();
        let (_, other_pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&other_pubkey, false);

        // Also stale, but the authorization check comes first.
        let auth = sign_request(&key, &pubkey, "attack.log", 100);
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 10_000),
            Err(TransferError::Unauthorized)
        ));
    }

    #[test]
    fn test_stale_request_rejected_before_signature() {
        let (_, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);

        // Garbage signature that could never verify; with a 300s window a
        // 400s-old timestamp must fail freshness without touching it.
        let auth = AuthContext {
            peer_pubkey: pubkey.clone(),
            declared_ts: 1000,
            signature: "deadbeef".to_string(),
        };
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 1400),
            Err(TransferError::StaleRequest)
        ));
    }

    #[test]
    fn test_future_timestamps_also_stale() {
        let (_, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);
        let auth = AuthContext {
            peer_pubkey: pubkey.clone(),
            declared_ts: 2000,
            signature: "deadbeef".to_string(),
        };
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 1400),
            Err(TransferError::StaleRequest)
        ));
    }

    #[test]
    fn test_replay_of_successful_request() {
        let (key, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);
        let auth = sign_request(&key, &pubkey, "attack.log", 1000);

        assert!(authenticator.verify("attack.log", &auth, 1000).is_ok());
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 1001),
            Err(TransferError::ReplayDetected)
        ));
    }

    #[test]
    fn test_wrong_key_signature_rejected() {
        let (wrong_key, _) = create_test_key();
        let (_, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);

        let auth = sign_request(&wrong_key, &pubkey, "attack.log", 1000);
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 1000),
            Err(TransferError::InvalidSignature)
        ));
    }

    #[test]
    fn test_signature_bound_to_target() {
        let (key, pubkey) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, false);

        let auth = sign_request(&key, &pubkey, "attack.log", 1000);
        assert!(matches!(
            authenticator.verify("other.log", &auth, 1000),
            Err(TransferError::InvalidSignature)
        ));
    }

    #[test]
    fn test_disable_signature_check_skips_only_step_four() {
        let (_, pubkey) = create_test_key();
        let (_, stranger) = create_test_key();
        let authenticator = create_test_authenticator(&pubkey, true);

        // Garbage signature is accepted for an authorized peer.
        let auth = AuthContext {
            peer_pubkey: pubkey.clone(),
            declared_ts: 1000,
            signature: "deadbeef".to_string(),
        };
        assert!(authenticator.verify("attack.log", &auth, 1000).is_ok());

        // Replay detection still applies.
        assert!(matches!(
            authenticator.verify("attack.log", &auth, 1001),
            Err(TransferError::ReplayDetected)
        ));

        // Authorization still applies.
        let stranger_auth = AuthContext {
            peer_pubkey: stranger,
            declared_ts: 1000,
            signature: "deadbeef".to_string(),
        };
        assert!(matches!(
            authenticator.verify("attack.log", &stranger_auth, 1000),
            Err(TransferError::Unauthorized)
        ));

        // Freshness still applies.
        let stale_auth = AuthContext {
            peer_pubkey: pubkey,
            declared_ts: 0,
            signature: "beefbeef".to_string(),
        };
        assert!(matches!(
            authenticator.verify("attack.log", &stale_auth, 1000),
            Err(TransferError::StaleRequest)
        ));
    }
}

mod service {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |_| {});
        let (key, pubkey) = create_test_key();
        service.authorized_peers().insert(&pubkey);

        let payload = b"one line of evidence\n".to_vec();
        let auth = sign_request(&key, &pubkey, "attack.log", now_unix());
        let response = service.upload(&payload, "attack.log", &auth).await.unwrap();

        assert_eq!(response.size, payload.len() as u64);
        assert_eq!(response.hash, hex::encode(Sha256::digest(&payload)));
        assert!(response.url.ends_with(&format!("/logs/{}", response.log_id)));

        // Fresh signature for the download; the target is the log id.
        let auth = sign_request(&key, &pubkey, &response.log_id, now_unix() + 1);
        let (stored, bytes) = service.download(&response.log_id, &auth).await.unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(stored.sha256, response.hash);

        // Metadata needs no auth and carries the recorded hash.
        let metadata = service.metadata(&response.log_id).unwrap();
        assert_eq!(metadata.sha256, response.hash);
        assert_eq!(metadata.uploader_pubkey, pubkey);
    }

    #[tokio::test]
    async fn test_upload_at_exact_size_limit_and_one_over() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |config| {
            config.store.max_log_size = 10 * 1024 * 1024;
            config.store.max_storage = 64 * 1024 * 1024;
        });
        let (key, pubkey) = create_test_key();
        service.authorized_peers().insert(&pubkey);

        let exactly = vec![0xaa; 10 * 1024 * 1024];
        let auth = sign_request(&key, &pubkey, "full.log", now_unix());
        assert!(service.upload(&exactly, "full.log", &auth).await.is_ok());

        let over = vec![0xbb; 10 * 1024 * 1024 + 1];
        let auth = sign_request(&key, &pubkey, "over.log", now_unix() + 1);
        assert!(matches!(
            service.upload(&over, "over.log", &auth).await,
            Err(TransferError::SizeExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_replayed_upload_rejected_fresh_retry_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |_| {});
        let (key, pubkey) = create_test_key();
        service.authorized_peers().insert(&pubkey);

        let payload = b"replayable payload".to_vec();
        let ts = now_unix();
        let auth = sign_request(&key, &pubkey, "attack.log", ts);

        service.upload(&payload, "attack.log", &auth).await.unwrap();

        // Byte-identical replay one second later.
        assert!(matches!(
            service.upload(&payload, "attack.log", &auth).await,
            Err(TransferError::ReplayDetected)
        ));

        // Same payload, structurally new request: new timestamp, new
        // signature.
        let fresh = sign_request(&key, &pubkey, "attack.log", ts + 1);
        assert!(service.upload(&payload, "attack.log", &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_download_of_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |_| {});
        let (key, pubkey) = create_test_key();
        service.authorized_peers().insert(&pubkey);

        let auth = sign_request(&key, &pubkey, "0123456789abcdef", now_unix());
        assert!(matches!(
            service.download("0123456789abcdef", &auth).await,
            Err(TransferError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_daily_bandwidth_quota_on_download() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |config| {
            config.bandwidth = BandwidthConfig { daily_limit: 100 };
        });
        let (uploader, uploader_pubkey) = create_test_key();
        let (downloader, downloader_pubkey) = create_test_key();
        service.authorized_peers().insert(&uploader_pubkey);
        service.authorized_peers().insert(&downloader_pubkey);

        let payload = vec![0u8; 80];
        let auth = sign_request(&uploader, &uploader_pubkey, "big.log", now_unix());
        let response = service.upload(&payload, "big.log", &auth).await.unwrap();

        let auth = sign_request(&downloader, &downloader_pubkey, &response.log_id, now_unix());
        assert!(service.download(&response.log_id, &auth).await.is_ok());

        // A second 80-byte download would cross the 100-byte daily cap.
        let auth = sign_request(
            &downloader,
            &downloader_pubkey,
            &response.log_id,
            now_unix() + 1,
        );
        assert!(matches!(
            service.download(&response.log_id, &auth).await,
            Err(TransferError::QuotaExceeded)
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_peer_cannot_upload() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |_| {});
        let (key, pubkey) = create_test_key();

        let auth = sign_request(&key, &pubkey, "attack.log", now_unix());
        assert!(matches!(
            service.upload(b"nope", "attack.log", &auth).await,
            Err(TransferError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_recent_lists_fresh_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_test_service(dir.path(), |_| {});
        let (key, pubkey) = create_test_key();
        service.authorized_peers().insert(&pubkey);

        let auth = sign_request(&key, &pubkey, "fresh.log", now_unix());
        service.upload(b"fresh bytes", "fresh.log", &auth).await.unwrap();

        let recent = service.recent(60);
        assert_eq!(recent["count"], 1);
        assert_eq!(recent["logs"][0]["filename"], "fresh.log");

        let health = service.health();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["logs_stored"], 1);
    }
}
