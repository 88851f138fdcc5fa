use sentinel_aggregator::Aggregator;
use sentinel_primitives::TelemetryEvent;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::{debug, warn};

/// Tails the RPC access log and feeds each well-formed line into the
/// aggregator.
///
/// Starts at the end of the file on first open, so a restart does not
/// re-aggregate history. Handles the file disappearing (waits for it to
/// come back) and shrinking (rotated in place, re-read from the start).
/// Malformed lines are rejected at this boundary and never reach a window.
pub struct TelemetrySource {
    path: PathBuf,
    poll_interval: Duration,
    reopen_interval: Duration,
}

impl TelemetrySource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            poll_interval: Duration::from_millis(20),
            reopen_interval: Duration::from_millis(250),
        }
    }

    pub async fn run(self, aggregator: Arc<Aggregator>) {
        let mut start_at_end = true;
        loop {
            let file = match File::open(&self.path).await {
                Ok(file) => file,
                Err(_) => {
                    tokio::time::sleep(self.reopen_interval).await;
                    continue;
                }
            };

            let len = file
                .metadata()
                .await
                .map(|metadata| metadata.len())
                .unwrap_or(0);
            let mut pos = if start_at_end { len } else { 0 };
            start_at_end = false;

            let mut reader = BufReader::new(file);
            if reader.seek(SeekFrom::Start(pos)).await.is_err() {
                tokio::time::sleep(self.reopen_interval).await;
                continue;
            }
            debug!(path = %self.path.display(), pos, "tailing telemetry log");

            // Lines may land in two writes; carry holds the partial line
            // until its newline shows up.
            let mut carry = String::new();
            loop {
                let mut chunk = String::new();
                match reader.read_line(&mut chunk).await {
                    Ok(0) => {
                        match tokio::fs::metadata(&self.path).await {
                            // Shrunk underneath us: reopen from the start.
                            Ok(metadata) if metadata.len() < pos => break,
                            Ok(_) => {}
                            Err(_) => break,
                        }
                        tokio::time::sleep(self.poll_interval).await;
                    }
                    Ok(read) => {
                        pos += read as u64;
                        carry.push_str(&chunk);
                        if carry.ends_with('\n') {
                            let line = std::mem::take(&mut carry);
                            if let Some(event) = parse_line(&line) {
                                aggregator.ingest(event);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading telemetry log, reopening");
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one access-log line into a telemetry event. Empty lines are
/// skipped silently; anything else that does not deserialize is logged
/// and dropped.
pub fn parse_line(line: &str) -> Option<TelemetryEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "skipping malformed telemetry line");
            None
        }
    }
}
