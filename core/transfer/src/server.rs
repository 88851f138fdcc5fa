// sentinel/core/transfer/src/server.rs

use crate::auth::{AuthContext, Authenticator, AuthorizedPeers};
use crate::bandwidth::{BandwidthConfig, BandwidthTracker};
use crate::error::TransferError;
use crate::ledger::LedgerClient;
use crate::replay::ReplayCache;
use crate::store::{LogStore, StoreConfig, StoredLog};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Address the service listens on
    pub listen_addr: SocketAddr,

    /// Base URL other peers reach this node at; used in upload responses
    pub public_url: String,

    /// File of authorized peer pubkeys, mirrored from the chain
    pub peers_file: Option<PathBuf>,

    /// Maximum age of a signed request's declared timestamp
    pub replay_window: Duration,

    /// Skip signature verification (step 4 of the auth protocol) ONLY.
    /// Authorization, freshness and replay checks still apply.
    pub disable_signature_check: bool,

    pub store: StoreConfig,
    pub bandwidth: BandwidthConfig,

    /// How often the peers file is re-read
    pub peers_refresh_interval: Duration,

    /// How often expired replay entries are swept
    pub replay_sweep_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".parse().expect("valid listen addr"),
            public_url: "http://localhost:9000".to_string(),
            peers_file: None,
            replay_window: Duration::from_secs(300),
            disable_signature_check: false,
            store: StoreConfig::default(),
            bandwidth: BandwidthConfig::default(),
            peers_refresh_interval: Duration::from_secs(60),
            replay_sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub log_id: String,
    pub url: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    minutes: Option<i64>,
}

/// Authenticated exchange of sealed log files between peers.
pub struct TransferService {
    config: TransferConfig,
    peers: Arc<AuthorizedPeers>,
    replay: Arc<ReplayCache>,
    authenticator: Authenticator,
    store: LogStore,
    bandwidth: BandwidthTracker,
    ledger: Arc<LedgerClient>,
}

impl TransferService {
    pub fn new(config: TransferConfig, ledger: LedgerClient) -> anyhow::Result<Arc<Self>> {
        let peers = Arc::new(AuthorizedPeers::new(config.peers_file.clone()));
        match peers.reload() {
            Ok(count) => info!(count, "loaded authorized peers"),
            Err(e) => warn!(error = %e, "no authorized peers loaded yet"),
        }

        let replay = Arc::new(ReplayCache::new(config.replay_window));
        let authenticator = Authenticator::new(
            peers.clone(),
            replay.clone(),
            config.replay_window,
            config.disable_signature_check,
        );
        let store = LogStore::open(config.store.clone())?;
        let bandwidth = BandwidthTracker::new(config.bandwidth.clone());

        Ok(Arc::new(Self {
            config,
            peers,
            replay,
            authenticator,
            store,
            bandwidth,
            ledger: Arc::new(ledger),
        }))
    }

    pub fn authorized_peers(&self) -> Arc<AuthorizedPeers> {
        self.peers.clone()
    }

    /// Accept one uploaded log.
    ///
    /// The uploader's auth is verified against the declared filename, the
    /// payload is admitted under the storage cap (evicting strictly older
    /// logs if needed), and the ledger is notified after the fact without
    /// ever affecting the response.
    pub async fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
        auth: &AuthContext,
    ) -> Result<UploadResponse, TransferError> {
        self.authenticator.verify(filename, auth, now_unix())?;

        let stored = self
            .store
            .put(bytes, filename, &auth.peer_pubkey, now_unix())?;
        self.bandwidth.charge(&auth.peer_pubkey, stored.size_bytes);

        let url = format!(
            "{}/logs/{}",
            self.config.public_url.trim_end_matches('/'),
            stored.log_id
        );
        info!(
            log_id = %stored.log_id,
            uploader = %abbrev(&auth.peer_pubkey),
            size = stored.size_bytes,
            "log uploaded"
        );

        if self.ledger.enabled() {
            let ledger = self.ledger.clone();
            let report_url = url.clone();
            let sha256 = stored.sha256.clone();
            tokio::spawn(async move {
                if let Err(e) = ledger.record_report(&report_url, &sha256).await {
                    warn!(url = %report_url, error = %e, "ledger notification failed");
                }
            });
        }

        Ok(UploadResponse {
            log_id: stored.log_id,
            url,
            hash: stored.sha256,
            size: stored.size_bytes,
        })
    }

    /// Serve one stored log to an authenticated peer within its daily
    /// bandwidth quota.
    pub async fn download(
        &self,
        log_id: &str,
        auth: &AuthContext,
    ) -> Result<(StoredLog, Vec<u8>), TransferError> {
        self.authenticator.verify(log_id, auth, now_unix())?;

        let stored = self.store.metadata(log_id).ok_or(TransferError::NotFound)?;
        self.bandwidth.check(&auth.peer_pubkey, stored.size_bytes)?;

        let (stored, bytes) = self.store.get(log_id)?;
        self.bandwidth.charge(&auth.peer_pubkey, stored.size_bytes);
        info!(
            log_id,
            requester = %abbrev(&auth.peer_pubkey),
            size = stored.size_bytes,
            "log downloaded"
        );
        Ok((stored, bytes))
    }

    pub fn metadata(&self, log_id: &str) -> Result<StoredLog, TransferError> {
        self.store.metadata(log_id).ok_or(TransferError::NotFound)
    }

    pub fn health(&self) -> serde_json::Value {
        let stats = self.store.stats();
        serde_json::json!({
            "status": "healthy",
            "logs_stored": stats.total_logs,
            "storage_used_mb": to_mb(stats.used_bytes),
            "storage_limit_mb": to_mb(self.config.store.max_storage),
            "authorized_peers": self.peers.len(),
            "my_url": self.config.public_url,
        })
    }

    pub fn stats(&self) -> serde_json::Value {
        let stats = self.store.stats();
        serde_json::json!({
            "total_logs": stats.total_logs,
            "total_size_bytes": stats.used_bytes,
            "total_size_mb": to_mb(stats.used_bytes),
            "storage_limit_mb": to_mb(self.config.store.max_storage),
            "authorized_peers": self.peers.len(),
            "replay_cache_entries": self.replay.len(),
            "bandwidth_usage": self.bandwidth.snapshot(10),
        })
    }

    pub fn recent(&self, minutes: i64) -> serde_json::Value {
        let since = now_unix() - minutes.max(0) * 60;
        let logs = self.store.recent(since);
        serde_json::json!({
            "count": logs.len(),
            "logs": logs,
        })
    }

    pub fn router(self: &Arc<Self>) -> axum::Router {
        let body_limit = self.store.max_log_size() as usize + 64 * 1024;
        axum::Router::new()
            .route("/logs", post(upload_log))
            .route("/logs/:log_id", get(download_log))
            .route("/logs/:log_id/metadata", get(log_metadata))
            .route("/health", get(health))
            .route("/stats", get(stats))
            .route("/recent_logs", get(recent_logs))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    /// Bind and serve, with the peers refresh and replay sweep running
    /// alongside.
    pub async fn serve(self: Arc<Self>) -> anyhow::Result<()> {
        tokio::spawn(
            self.peers
                .clone()
                .run_refresh(self.config.peers_refresh_interval),
        );
        tokio::spawn(
            self.replay
                .clone()
                .run_sweeper(self.config.replay_sweep_interval),
        );

        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "transfer service listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn upload_log(
    State(service): State<Arc<TransferService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, TransferError> {
    let auth = auth_from_headers(&headers)?;
    let filename = header_str(&headers, "x-filename").unwrap_or("upload.log");

    service
        .upload(&body, filename, &auth)
        .await
        .map(Json)
        .inspect_err(|e| {
            warn!(
                peer = %abbrev(&auth.peer_pubkey),
                filename,
                error = %e,
                "upload rejected"
            )
        })
}

async fn download_log(
    State(service): State<Arc<TransferService>>,
    Path(log_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, TransferError> {
    let auth = auth_from_headers(&headers)?;

    let (stored, bytes) = service
        .download(&log_id, &auth)
        .await
        .inspect_err(|e| {
            warn!(
                peer = %abbrev(&auth.peer_pubkey),
                log_id,
                error = %e,
                "download rejected"
            )
        })?;

    let disposition = format!("attachment; filename=\"{}.log\"", stored.log_id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn log_metadata(
    State(service): State<Arc<TransferService>>,
    Path(log_id): Path<String>,
) -> Result<Json<StoredLog>, TransferError> {
    service.metadata(&log_id).map(Json)
}

async fn health(State(service): State<Arc<TransferService>>) -> Json<serde_json::Value> {
    Json(service.health())
}

async fn stats(State(service): State<Arc<TransferService>>) -> Json<serde_json::Value> {
    Json(service.stats())
}

async fn recent_logs(
    State(service): State<Arc<TransferService>>,
    Query(params): Query<RecentParams>,
) -> Json<serde_json::Value> {
    Json(service.recent(params.minutes.unwrap_or(60)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn auth_from_headers(headers: &HeaderMap) -> Result<AuthContext, TransferError> {
    let peer_pubkey = header_str(headers, "x-peer-pubkey")
        .ok_or_else(|| TransferError::BadRequest("missing x-peer-pubkey header".into()))?
        .to_string();
    let declared_ts = header_str(headers, "x-timestamp")
        .ok_or_else(|| TransferError::BadRequest("missing x-timestamp header".into()))?
        .parse::<i64>()
        .map_err(|_| TransferError::BadRequest("x-timestamp must be a unix timestamp".into()))?;
    let signature = header_str(headers, "x-signature")
        .ok_or_else(|| TransferError::BadRequest("missing x-signature header".into()))?
        .to_string();

    Ok(AuthContext {
        peer_pubkey,
        declared_ts,
        signature,
    })
}

fn abbrev(pubkey: &str) -> &str {
    if pubkey.len() > 8 {
        &pubkey[..8]
    } else {
        pubkey
    }
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
