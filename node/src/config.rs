use sentinel_aggregator::AggregatorConfig;
use sentinel_router::{ClassifierConfig, RotationConfig};
use sentinel_transfer::{BandwidthConfig, LedgerConfig, StoreConfig, TransferConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Telemetry agent configuration
    pub agent: AgentConfig,

    /// Classification thresholds
    pub classifier: ClassifierSettings,

    /// File rotation configuration
    pub rotation: RotationSettings,

    /// Peer transfer service configuration
    pub transfer: TransferSettings,

    /// Reputation ledger configuration
    pub ledger: LedgerSettings,

    /// Logging configuration
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Region label stamped on every diagnostic
    pub region: String,

    /// Autonomous system number of this deployment
    pub asn: u32,

    /// RPC access log tailed for telemetry events
    pub log_path: PathBuf,

    /// Aggregation window in milliseconds
    pub window_ms: u64,

    /// Salt for client fingerprint hashing
    pub salt: String,

    /// Methods worth aggregating; empty means all
    pub methods_heavy: Vec<String>,

    /// Latency samples kept per key per window
    pub reservoir_capacity: usize,

    /// EMA smoothing factor for the baselines
    pub ema_alpha: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub err_thr: f64,
    pub p95_thr: f64,
    pub zlat_thr: f64,
    pub zerr_thr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Directory for normal-track files
    pub normal_dir: PathBuf,

    /// Directory for malicious-track files
    pub malicious_dir: PathBuf,

    /// Normal track rotation period (minutes)
    pub normal_window_min: u64,

    /// Malicious track rotation period (minutes)
    pub malicious_window_min: u64,

    /// Retention for sealed normal files (minutes, 0 keeps forever)
    pub normal_ttl_min: u64,

    /// Retention for sealed malicious files (minutes, 0 keeps forever)
    pub malicious_ttl_min: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Listen address of the transfer service
    pub listen_addr: SocketAddr,

    /// Base URL peers reach this node at
    pub public_url: String,

    /// Authorized peer pubkeys, one hex key per line
    pub peers_file: Option<PathBuf>,

    /// Directory for uploaded logs
    pub logs_dir: PathBuf,

    /// Largest accepted upload (bytes)
    pub max_log_size: u64,

    /// Total storage cap (bytes)
    pub max_storage: u64,

    /// Replay window for signed requests (seconds)
    pub replay_window_secs: u64,

    /// Per-peer daily bandwidth cap (bytes)
    pub daily_bandwidth_limit: u64,

    /// Skip signature verification; authorization, freshness and replay
    /// checks still apply. Never enable in production.
    pub disable_signature_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Ledger endpoint for upload notifications; absent disables them
    pub endpoint: Option<String>,

    /// Outbound call timeout (seconds)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default log level when RUST_LOG is unset
    pub level: String,

    /// Output format: pretty, json or compact
    pub format: String,

    /// Log to this file instead of stdout
    pub file: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                region: "eu-central".to_string(),
                asn: 64512,
                log_path: PathBuf::from("data/rpc.jsonl"),
                window_ms: 250,
                salt: "change-me".to_string(),
                methods_heavy: vec![
                    "getProgramAccounts".to_string(),
                    "getLogs".to_string(),
                ],
                reservoir_capacity: 2000,
                ema_alpha: 0.1,
            },
            classifier: ClassifierSettings {
                err_thr: 0.05,
                p95_thr: 250.0,
                zlat_thr: 4.0,
                zerr_thr: 2.0,
            },
            rotation: RotationSettings {
                normal_dir: PathBuf::from("data/logs_normal"),
                malicious_dir: PathBuf::from("data/malicious_logs"),
                normal_window_min: 30,
                malicious_window_min: 3,
                normal_ttl_min: 120,
                malicious_ttl_min: 0,
            },
            transfer: TransferSettings {
                listen_addr: "0.0.0.0:9000".parse().expect("valid listen addr"),
                public_url: "http://localhost:9000".to_string(),
                peers_file: Some(PathBuf::from("data/authorized_peers.txt")),
                logs_dir: PathBuf::from("data/logs"),
                max_log_size: 10 * 1024 * 1024,
                max_storage: 1024 * 1024 * 1024,
                replay_window_secs: 300,
                daily_bandwidth_limit: 100 * 1024 * 1024,
                disable_signature_check: false,
            },
            ledger: LedgerSettings {
                endpoint: None,
                timeout_secs: 10,
            },
            log: LogSettings {
                level: "info".to_string(),
                format: "pretty".to_string(),
                file: None,
            },
        }
    }
}

impl NodeConfig {
    /// Load from file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<Self> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(self.clone())
    }

    /// Re-root every relative data path under `dir`.
    pub fn apply_data_dir(&mut self, dir: &PathBuf) {
        for path in [
            &mut self.agent.log_path,
            &mut self.rotation.normal_dir,
            &mut self.rotation.malicious_dir,
            &mut self.transfer.logs_dir,
        ] {
            if path.is_relative() {
                *path = dir.join(path.as_path());
            }
        }
        if let Some(peers) = &mut self.transfer.peers_file {
            if peers.is_relative() {
                *peers = dir.join(peers.as_path());
            }
        }
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            window_ms: self.agent.window_ms,
            reservoir_capacity: self.agent.reservoir_capacity,
            ema_alpha: self.agent.ema_alpha,
            salt: self.agent.salt.clone(),
            methods_heavy: self.agent.methods_heavy.clone(),
            ..AggregatorConfig::default()
        }
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            err_thr: self.classifier.err_thr,
            p95_thr: self.classifier.p95_thr,
            zlat_thr: self.classifier.zlat_thr,
            zerr_thr: self.classifier.zerr_thr,
        }
    }

    pub fn rotation(&self) -> RotationConfig {
        let ttl = |minutes: u64| {
            (minutes > 0).then(|| Duration::from_secs(minutes * 60))
        };
        RotationConfig {
            normal_dir: self.rotation.normal_dir.clone(),
            malicious_dir: self.rotation.malicious_dir.clone(),
            normal_window: Duration::from_secs(self.rotation.normal_window_min * 60),
            malicious_window: Duration::from_secs(self.rotation.malicious_window_min * 60),
            normal_ttl: ttl(self.rotation.normal_ttl_min),
            malicious_ttl: ttl(self.rotation.malicious_ttl_min),
            ..RotationConfig::default()
        }
    }

    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            listen_addr: self.transfer.listen_addr,
            public_url: self.transfer.public_url.clone(),
            peers_file: self.transfer.peers_file.clone(),
            replay_window: Duration::from_secs(self.transfer.replay_window_secs),
            disable_signature_check: self.transfer.disable_signature_check,
            store: StoreConfig {
                dir: self.transfer.logs_dir.clone(),
                max_log_size: self.transfer.max_log_size,
                max_storage: self.transfer.max_storage,
            },
            bandwidth: BandwidthConfig {
                daily_limit: self.transfer.daily_bandwidth_limit,
            },
            ..TransferConfig::default()
        }
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            endpoint: self.ledger.endpoint.clone(),
            timeout: Duration::from_secs(self.ledger.timeout_secs),
        }
    }
}
