// sentinel/core/router/src/rotation_tests.rs

use crate::classifier::ClassifierConfig;
use crate::rotation::{spawn_track, RotationConfig, TrackWriter};
use crate::router::spawn_router;
use sentinel_broker::{topics, Broker, BrokerConfig};
use sentinel_primitives::{Diagnostic, Track, WindowMetrics, ZScores};
use std::path::Path;
use std::time::Duration;

fn create_test_diagnostic(ts: i64, err_rate: f64) -> Diagnostic {
    Diagnostic {
        ts,
        window_ms: 250,
        region: "eu-central".into(),
        asn: 64512,
        method: "getLogs".into(),
        metrics: WindowMetrics {
            p95: 42.0,
            err_rate,
            count: 10,
        },
        z: ZScores { lat: 0.0, err: 0.0 },
        sample: None,
    }
}

fn create_test_config(dir: &Path, window: Duration) -> RotationConfig {
    RotationConfig {
        normal_dir: dir.join("normal"),
        malicious_dir: dir.join("malicious"),
        normal_window: window,
        malicious_window: window,
        normal_ttl: None,
        malicious_ttl: None,
        ..RotationConfig::default()
    }
}

fn read_lines(path: &Path) -> Vec<Diagnostic> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn jsonl_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    files
}

#[test]
fn test_append_writes_one_line_per_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let mut writer = TrackWriter::new(Track::Normal, &config).unwrap();

    writer.append(&create_test_diagnostic(1, 0.0)).unwrap();
    writer.append(&create_test_diagnostic(2, 0.0)).unwrap();

    let path = writer.current_path().unwrap().to_path_buf();
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].ts, 1);
    assert_eq!(lines[1].ts, 2);
}

#[test]
fn test_no_file_until_first_append() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let writer = TrackWriter::new(Track::Normal, &config).unwrap();

    assert!(writer.current_path().is_none());
    assert!(jsonl_files(&config.normal_dir).is_empty());
}

#[test]
fn test_rotation_seals_before_opening_next() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_millis(80));
    let mut writer = TrackWriter::new(Track::Normal, &config).unwrap();

    writer.append(&create_test_diagnostic(1, 0.0)).unwrap();
    writer.append(&create_test_diagnostic(2, 0.0)).unwrap();
    let first_path = writer.current_path().unwrap().to_path_buf();

    std::thread::sleep(Duration::from_millis(120));

    // First append past the due time goes to a fresh file.
    writer.append(&create_test_diagnostic(3, 0.0)).unwrap();
    let second_path = writer.current_path().unwrap().to_path_buf();
    assert_ne!(first_path, second_path);

    // The sealed file holds exactly the pre-boundary diagnostics and the
    // boundary diagnostic is only in the new file.
    let sealed = read_lines(&first_path);
    assert_eq!(sealed.iter().map(|d| d.ts).collect::<Vec<_>>(), vec![1, 2]);
    let open = read_lines(&second_path);
    assert_eq!(open.iter().map(|d| d.ts).collect::<Vec<_>>(), vec![3]);
}

#[test]
fn test_sealed_file_never_appended_again() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_millis(60));
    let mut writer = TrackWriter::new(Track::Normal, &config).unwrap();

    writer.append(&create_test_diagnostic(1, 0.0)).unwrap();
    let first_path = writer.current_path().unwrap().to_path_buf();
    let sealed_before = std::fs::read_to_string(&first_path).unwrap();

    std::thread::sleep(Duration::from_millis(100));
    for ts in 2..10 {
        writer.append(&create_test_diagnostic(ts, 0.0)).unwrap();
    }

    let sealed_after = std::fs::read_to_string(&first_path).unwrap();
    assert_eq!(sealed_before, sealed_after);
}

#[test]
fn test_explicit_seal_allows_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let mut writer = TrackWriter::new(Track::Malicious, &config).unwrap();

    writer.append(&create_test_diagnostic(1, 0.2)).unwrap();
    writer.seal().unwrap();
    assert!(writer.current_path().is_none());

    writer.append(&create_test_diagnostic(2, 0.2)).unwrap();
    assert!(writer.current_path().is_some());
}

#[tokio::test]
async fn test_track_task_writes_and_seals_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let handle = spawn_track(Track::Normal, config.clone()).unwrap();

    for ts in 0..5 {
        handle.tx.send(create_test_diagnostic(ts, 0.0)).await.unwrap();
    }
    drop(handle.tx);
    handle.task.await.unwrap().unwrap();

    let files = jsonl_files(&config.normal_dir);
    assert_eq!(files.len(), 1);
    assert_eq!(read_lines(&files[0]).len(), 5);
}

#[tokio::test]
async fn test_router_partitions_by_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let broker = Broker::new(BrokerConfig::default());
    let handles = spawn_router(&broker, ClassifierConfig::default(), config.clone()).unwrap();

    // err_rate 0.10 is malicious, 0.0 is normal
    broker
        .publish_json(topics::DIAG, &create_test_diagnostic(1, 0.10))
        .unwrap();
    broker
        .publish_json(topics::DIAG, &create_test_diagnostic(2, 0.0))
        .unwrap();

    drop(broker);
    handles.join().await.unwrap();

    let malicious = jsonl_files(&config.malicious_dir);
    assert_eq!(malicious.len(), 1);
    let lines = read_lines(&malicious[0]);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].ts, 1);

    let normal = jsonl_files(&config.normal_dir);
    assert_eq!(normal.len(), 1);
    assert_eq!(read_lines(&normal[0])[0].ts, 2);
}

#[tokio::test]
async fn test_alert_topic_forces_malicious_track() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let broker = Broker::new(BrokerConfig::default());
    let handles = spawn_router(&broker, ClassifierConfig::default(), config.clone()).unwrap();

    // Quiet metrics, but injected on the alert topic.
    broker
        .publish_json(topics::ALERT, &create_test_diagnostic(7, 0.0))
        .unwrap();

    drop(broker);
    handles.join().await.unwrap();

    let malicious = jsonl_files(&config.malicious_dir);
    assert_eq!(malicious.len(), 1);
    assert_eq!(read_lines(&malicious[0])[0].ts, 7);
}

#[tokio::test]
async fn test_router_drops_malformed_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let broker = Broker::new(BrokerConfig::default());
    let handles = spawn_router(&broker, ClassifierConfig::default(), config.clone()).unwrap();

    broker.publish(topics::DIAG, b"not json at all".as_slice());
    broker
        .publish_json(topics::DIAG, &create_test_diagnostic(1, 0.0))
        .unwrap();

    drop(broker);
    handles.join().await.unwrap();

    let normal = jsonl_files(&config.normal_dir);
    assert_eq!(read_lines(&normal[0]).len(), 1);
}

#[tokio::test]
async fn test_health_messages_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), Duration::from_secs(3600));
    let broker = Broker::new(BrokerConfig::default());
    let handles = spawn_router(&broker, ClassifierConfig::default(), config.clone()).unwrap();

    broker.publish(topics::HEALTH, br#"{"status":"ok"}"#.as_slice());

    drop(broker);
    handles.join().await.unwrap();

    assert!(jsonl_files(&config.normal_dir).is_empty());
    assert!(jsonl_files(&config.malicious_dir).is_empty());
}
