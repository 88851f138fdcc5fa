// sentinel/core/router/src/rotation.rs

use sentinel_primitives::{Diagnostic, Track};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{track} track halted: {reason}")]
    Fatal { track: Track, reason: String },
}

/// Rotation and retention settings for both tracks.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub normal_dir: PathBuf,
    pub malicious_dir: PathBuf,

    /// Rotation period of the normal track
    pub normal_window: Duration,

    /// Rotation period of the malicious track
    pub malicious_window: Duration,

    /// Retention for sealed normal files; `None` keeps them forever
    pub normal_ttl: Option<Duration>,

    /// Retention for sealed malicious files; `None` keeps them forever
    pub malicious_ttl: Option<Duration>,

    /// Write attempts before a diagnostic is parked in the overflow buffer
    pub max_write_retries: u32,

    /// Delay between write attempts
    pub retry_backoff: Duration,

    /// Overflow buffer bound; exceeding it halts the track
    pub max_buffered_lines: usize,

    /// Capacity of each track's inbound channel
    pub channel_capacity: usize,

    /// Retention sweep period
    pub sweep_interval: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            normal_dir: PathBuf::from("data/logs_normal"),
            malicious_dir: PathBuf::from("data/malicious_logs"),
            normal_window: Duration::from_secs(30 * 60),
            malicious_window: Duration::from_secs(3 * 60),
            normal_ttl: Some(Duration::from_secs(120 * 60)),
            malicious_ttl: None,
            max_write_retries: 3,
            retry_backoff: Duration::from_millis(50),
            max_buffered_lines: 10_000,
            channel_capacity: 1024,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RotationConfig {
    pub fn dir_for(&self, track: Track) -> &Path {
        match track {
            Track::Malicious => &self.malicious_dir,
            Track::Normal => &self.normal_dir,
        }
    }

    pub fn window_for(&self, track: Track) -> Duration {
        match track {
            Track::Malicious => self.malicious_window,
            Track::Normal => self.normal_window,
        }
    }

    pub fn ttl_for(&self, track: Track) -> Option<Duration> {
        match track {
            Track::Malicious => self.malicious_ttl,
            Track::Normal => self.normal_ttl,
        }
    }
}

struct OpenFile {
    writer: BufWriter<File>,
    path: PathBuf,
    due_at: Instant,
}

/// File lifecycle state machine for one track: no file, or exactly one
/// open file that seals at its due time.
///
/// Every append is flushed individually, so sealing only has to sync and
/// close. The old file is fully sealed before the new file's first byte is
/// written; a diagnostic arriving at the boundary instant lands in the new
/// file.
pub struct TrackWriter {
    track: Track,
    dir: PathBuf,
    window: Duration,
    file: Option<OpenFile>,
}

impl TrackWriter {
    pub fn new(track: Track, config: &RotationConfig) -> Result<Self, RouterError> {
        let dir = config.dir_for(track).to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            track,
            dir,
            window: config.window_for(track),
            file: None,
        })
    }

    /// Append one diagnostic as a newline-terminated JSON line, rotating
    /// first if the open file is due.
    pub fn append(&mut self, diagnostic: &Diagnostic) -> Result<(), RouterError> {
        let line = serde_json::to_string(diagnostic)?;

        if self.file.as_ref().is_some_and(|f| Instant::now() >= f.due_at) {
            self.seal()?;
        }
        let file = self.ensure_open()?;
        file.writer.write_all(line.as_bytes())?;
        file.writer.write_all(b"\n")?;
        file.writer.flush()?;
        Ok(())
    }

    /// Seal the open file: flush, sync to disk, close. No further byte is
    /// ever written to a sealed file.
    pub fn seal(&mut self) -> Result<(), RouterError> {
        if let Some(mut file) = self.file.take() {
            file.writer.flush()?;
            file.writer.get_ref().sync_all()?;
            info!(track = %self.track, path = %file.path.display(), "sealed rotated file");
        }
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<&mut OpenFile, RouterError> {
        if self.file.is_none() {
            // Millisecond precision so the file sealed an instant ago can
            // never be reopened under the same name.
            let name = format!(
                "log-{}.jsonl",
                chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f")
            );
            let path = self.dir.join(name);
            let handle = OpenOptions::new().create(true).append(true).open(&path)?;
            info!(track = %self.track, path = %path.display(), "opened rotated file");
            self.file = Some(OpenFile {
                writer: BufWriter::new(handle),
                path,
                due_at: Instant::now() + self.window,
            });
        }
        Ok(self.file.as_mut().expect("file opened above"))
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }
}

/// Handle to a spawned track writer task.
pub struct TrackHandle {
    pub tx: mpsc::Sender<Diagnostic>,
    pub task: JoinHandle<Result<(), RouterError>>,
}

/// Spawn the single-owner writer task for one track.
///
/// The task drains its channel into the rotating file and runs the
/// retention sweep between messages. Dropping every sender seals the open
/// file and ends the task cleanly. A write failure that survives the
/// bounded retries parks diagnostics in an in-memory overflow buffer; if
/// that buffer fills, the task returns a fatal error instead of dropping
/// classified events.
pub fn spawn_track(track: Track, config: RotationConfig) -> Result<TrackHandle, RouterError> {
    let mut writer = TrackWriter::new(track, &config)?;
    let (tx, mut rx) = mpsc::channel::<Diagnostic>(config.channel_capacity.max(1));

    let task = tokio::spawn(async move {
        let mut pending: VecDeque<Diagnostic> = VecDeque::new();
        let mut sweeper = tokio::time::interval(config.sweep_interval);
        sweeper.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(diagnostic) => {
                            pending.push_back(diagnostic);
                            if pending.len() > config.max_buffered_lines {
                                return Err(RouterError::Fatal {
                                    track,
                                    reason: "overflow buffer full".to_string(),
                                });
                            }
                            drain(&mut writer, &mut pending, &config).await?;
                        }
                        None => {
                            drain(&mut writer, &mut pending, &config).await?;
                            if !pending.is_empty() {
                                return Err(RouterError::Fatal {
                                    track,
                                    reason: format!("{} diagnostics unwritten at shutdown", pending.len()),
                                });
                            }
                            writer.seal()?;
                            return Ok(());
                        }
                    }
                }
                _ = sweeper.tick() => {
                    if let Some(ttl) = config.ttl_for(track) {
                        match sweep_sealed(writer_dir(&config, track), ttl, writer.current_path()) {
                            Ok(0) => {}
                            Ok(removed) => info!(track = %track, removed, "retention sweep removed sealed files"),
                            Err(e) => warn!(track = %track, error = %e, "retention sweep failed"),
                        }
                    }
                }
            }
        }
    });

    Ok(TrackHandle { tx, task })
}

fn writer_dir(config: &RotationConfig, track: Track) -> &Path {
    config.dir_for(track)
}

/// Write out everything buffered, retrying each line a bounded number of
/// times. Lines that keep failing stay buffered for the next attempt.
async fn drain(
    writer: &mut TrackWriter,
    pending: &mut VecDeque<Diagnostic>,
    config: &RotationConfig,
) -> Result<(), RouterError> {
    while let Some(diagnostic) = pending.front().cloned() {
        let mut attempts = 0;
        loop {
            match writer.append(&diagnostic) {
                Ok(()) => {
                    pending.pop_front();
                    break;
                }
                Err(RouterError::Encode(e)) => {
                    warn!(error = %e, "unencodable diagnostic dropped");
                    pending.pop_front();
                    break;
                }
                Err(e) => {
                    attempts += 1;
                    if attempts > config.max_write_retries {
                        warn!(
                            track = %writer.track,
                            buffered = pending.len(),
                            error = %e,
                            "writes failing, diagnostics held in memory"
                        );
                        return Ok(());
                    }
                    debug!(attempt = attempts, error = %e, "append failed, retrying");
                    tokio::time::sleep(config.retry_backoff).await;
                }
            }
        }
    }
    Ok(())
}

/// Delete sealed files older than `ttl`. The live file is never touched.
fn sweep_sealed(dir: &Path, ttl: Duration, live: Option<&Path>) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        if live == Some(path.as_path()) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified.elapsed().map(|age| age > ttl).unwrap_or(false) {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed expired sealed file");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove expired file"),
            }
        }
    }
    Ok(removed)
}
