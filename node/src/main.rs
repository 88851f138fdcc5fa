use anyhow::Result;
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use sentinel_aggregator::Aggregator;
use sentinel_broker::{topics, Broker, BrokerConfig};
use sentinel_router::spawn_router;
use sentinel_transfer::{LedgerClient, TransferService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod logging;
mod source;

use config::NodeConfig;
use source::TelemetrySource;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Sentinel telemetry node: anomaly detection and peer log exchange")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory for relative data paths
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Transfer service listen address (e.g. 0.0.0.0:9000)
    #[arg(long, value_name = "ADDR")]
    listen_addr: Option<String>,

    /// Region label stamped on diagnostics
    #[arg(long)]
    region: Option<String>,

    /// Autonomous system number of this deployment
    #[arg(long)]
    asn: Option<u32>,

    /// RPC access log to tail
    #[arg(long, value_name = "FILE")]
    telemetry_log: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Where to write it
        #[arg(long, value_name = "FILE", default_value = "sentinel.toml")]
        path: PathBuf,
    },

    /// Generate a new peer identity
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path }) => {
            NodeConfig::default().save(&path)?;
            println!("wrote default configuration to {}", path.display());
            return Ok(());
        }
        Some(Commands::Keygen) => {
            generate_keypair();
            return Ok(());
        }
        None => {}
    }

    // Load or create config, then apply CLI overrides
    let mut config = if let Some(config_path) = &cli.config {
        NodeConfig::from_file(config_path)?
    } else {
        NodeConfig::default()
    };

    if let Some(data_dir) = &cli.data_dir {
        config.apply_data_dir(data_dir);
    }
    if let Some(listen_addr) = cli.listen_addr {
        config.transfer.listen_addr = listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;
    }
    if let Some(region) = cli.region {
        config.agent.region = region;
    }
    if let Some(asn) = cli.asn {
        config.agent.asn = asn;
    }
    if let Some(telemetry_log) = cli.telemetry_log {
        config.agent.log_path = telemetry_log;
    }

    logging::init_logging(&config.log)?;
    run_node(config).await
}

async fn run_node(config: NodeConfig) -> Result<()> {
    info!(
        region = %config.agent.region,
        asn = config.agent.asn,
        "starting sentinel node"
    );
    if config.transfer.disable_signature_check {
        warn!("transfer service running with signature verification disabled");
    }

    let broker = Arc::new(Broker::new(BrokerConfig::default()));
    let aggregator = Arc::new(Aggregator::new(config.aggregator(), broker.clone()));
    let router = spawn_router(&broker, config.classifier(), config.rotation())?;

    let ledger = LedgerClient::new(config.ledger())?;
    let transfer = TransferService::new(config.transfer(), ledger)?;

    tokio::spawn(aggregator.clone().run());
    tokio::spawn(TelemetrySource::new(config.agent.log_path.clone()).run(aggregator.clone()));
    tokio::spawn(run_heartbeat(
        broker.clone(),
        config.agent.region.clone(),
        config.agent.asn,
    ));
    let transfer_task = tokio::spawn(transfer.serve());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = router.join() => {
            match result {
                Ok(()) => info!("pipeline ended"),
                Err(e) => {
                    error!(error = %e, "pipeline halted");
                    return Err(e.into());
                }
            }
        }
        result = transfer_task => {
            match result {
                Ok(Ok(())) => info!("transfer service ended"),
                Ok(Err(e)) => {
                    error!(error = %e, "transfer service failed");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "transfer service panicked");
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}

/// Publish a liveness heartbeat every few seconds.
async fn run_heartbeat(broker: Arc<Broker>, region: String, asn: u32) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        let payload = serde_json::json!({
            "ts": std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            "region": region,
            "asn": asn,
            "status": "ok",
        });
        if let Err(e) = broker.publish_json(topics::HEALTH, &payload) {
            warn!(error = %e, "failed to publish heartbeat");
        }
    }
}

/// Generate an ed25519 identity for the peer exchange.
fn generate_keypair() {
    let signing_key = SigningKey::from_bytes(&rand::random());
    println!(
        "public key (share with peers):  {}",
        hex::encode(signing_key.verifying_key().to_bytes())
    );
    println!(
        "secret key (keep private):      {}",
        hex::encode(signing_key.to_bytes())
    );
}
