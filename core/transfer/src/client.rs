// sentinel/core/transfer/src/client.rs

use crate::auth::AuthContext;
use crate::server::UploadResponse;
use crate::store::StoredLog;
use anyhow::{anyhow, Context};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Signing client for another peer's transfer service.
///
/// Signs the canonical message for each request and verifies downloaded
/// bytes against the expected content hash before handing them out.
pub struct PeerClient {
    signing_key: SigningKey,
    pubkey_hex: String,
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(signing_key: SigningKey) -> anyhow::Result<Self> {
        let pubkey_hex = hex::encode(signing_key.verifying_key().to_bytes());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            signing_key,
            pubkey_hex,
            http,
        })
    }

    pub fn pubkey_hex(&self) -> &str {
        &self.pubkey_hex
    }

    fn sign(&self, target: &str, declared_ts: i64) -> String {
        let message = AuthContext::canonical_message(target, declared_ts, &self.pubkey_hex);
        hex::encode(self.signing_key.sign(&message).to_bytes())
    }

    /// Upload a sealed log file to a peer's `/logs` endpoint.
    pub async fn upload(
        &self,
        server_url: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<UploadResponse> {
        let declared_ts = now_unix();
        let signature = self.sign(filename, declared_ts);

        let response = self
            .http
            .post(format!("{}/logs", server_url.trim_end_matches('/')))
            .header("x-peer-pubkey", &self.pubkey_hex)
            .header("x-timestamp", declared_ts.to_string())
            .header("x-signature", signature)
            .header("x-filename", filename)
            .body(bytes)
            .send()
            .await
            .context("upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("upload rejected: {status} {body}"));
        }
        Ok(response.json().await?)
    }

    /// Download a log by URL and verify it against the hash recorded on
    /// the ledger.
    pub async fn download(&self, log_url: &str, expected_sha256: &str) -> anyhow::Result<Vec<u8>> {
        let log_id = match log_url.rsplit_once("/logs/") {
            Some((_, id)) => id,
            None => return Err(anyhow!("no log id in url: {log_url}")),
        };
        let declared_ts = now_unix();
        let signature = self.sign(log_id, declared_ts);

        let response = self
            .http
            .get(log_url)
            .header("x-peer-pubkey", &self.pubkey_hex)
            .header("x-timestamp", declared_ts.to_string())
            .header("x-signature", signature)
            .send()
            .await
            .context("download request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("download rejected: {}", response.status()));
        }

        let bytes = response.bytes().await?.to_vec();
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != expected_sha256 {
            return Err(anyhow!(
                "hash mismatch: expected {expected_sha256}, got {actual}"
            ));
        }
        Ok(bytes)
    }

    /// Fetch a log's public metadata.
    pub async fn metadata(&self, log_url: &str) -> anyhow::Result<StoredLog> {
        let response = self
            .http
            .get(format!("{log_url}/metadata"))
            .send()
            .await
            .context("metadata request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("metadata rejected: {}", response.status()));
        }
        Ok(response.json().await?)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
