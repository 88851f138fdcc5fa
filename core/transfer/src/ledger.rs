// sentinel/core/transfer/src/ledger.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Reputation ledger endpoint; `None` disables notification
    pub endpoint: Option<String>,

    /// Outbound request timeout
    pub timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct RecordReportRequest<'a> {
    url: &'a str,
    sha256: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerReceipt {
    pub receipt: String,
}

/// Notifier for the external reputation ledger.
///
/// The ledger runs on a foreign virtual machine with its own consensus;
/// this client only fires one best-effort "report recorded" call after a
/// successful upload. The upload is authoritative either way: callers log
/// failures and never roll anything back.
pub struct LedgerClient {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl LedgerClient {
    pub fn new(config: LedgerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            endpoint: config.endpoint,
            http,
        })
    }

    pub fn enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Record a completed upload on the ledger. Returns `None` when no
    /// endpoint is configured.
    pub async fn record_report(
        &self,
        url: &str,
        sha256: &str,
    ) -> anyhow::Result<Option<LedgerReceipt>> {
        let Some(endpoint) = &self.endpoint else {
            debug!("ledger notification disabled");
            return Ok(None);
        };

        let response = self
            .http
            .post(endpoint)
            .json(&RecordReportRequest { url, sha256 })
            .send()
            .await?
            .error_for_status()?;

        let receipt: LedgerReceipt = response.json().await?;
        info!(url, receipt = %receipt.receipt, "recorded report on ledger");
        Ok(Some(receipt))
    }
}
