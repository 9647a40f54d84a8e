use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn memedoc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("memedoc");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let feeds_dir = root.join("feeds");
    fs::create_dir_all(&feeds_dir).unwrap();

    // Port 9 (discard) is closed on test hosts, so every fetch fails fast.
    fs::write(
        feeds_dir.join("reddit.json"),
        r#"[
  {
    "source": "reddit",
    "item_id": "t3_one",
    "title": "when the build passes first try",
    "media_url": "http://127.0.0.1:9/one.png",
    "score": 1500,
    "created_at": "2024-05-01T12:00:00Z",
    "tags": ["programming"]
  },
  {
    "source": "reddit",
    "item_id": "t3_two",
    "title": "cat picture",
    "media_url": "http://127.0.0.1:9/two.jpg",
    "score": 20,
    "created_at": "2024-05-01T13:00:00Z",
    "tags": ["cats"]
  },
  {
    "source": "reddit",
    "item_id": "t3_text",
    "title": "text only",
    "media_url": "https://www.reddit.com/r/programming/comments/abc",
    "score": 3,
    "created_at": "2024-05-01T14:00:00Z",
    "tags": ["programming"]
  }
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/memedoc.sqlite"

[pipeline]
concurrency = 2
workers = 2

[fetch]
timeout_secs = 5
connect_timeout_secs = 2

[logging]
level = "warn"

[sources.reddit]
kind = "manifest"
path = "{root}/feeds/reddit.json"

[sources.archive]
kind = "manifest"
path = "{root}/feeds/missing.json"
enabled = false
"#,
        root = root.display()
    );

    let config_path = config_dir.join("memedoc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_memedoc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = memedoc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run memedoc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_memedoc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/memedoc.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_memedoc(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_memedoc(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_health() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_memedoc(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    assert!(stdout.contains("reddit"));
    assert!(stdout.contains("archive"));
    assert!(stdout.contains("DISABLED"));
}

#[test]
fn test_ingest_dry_run_counts_media_items() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_memedoc(
        &config_path,
        &["ingest", "reddit", "--topic", "programming", "--dry-run", "--progress", "off"],
    );
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("media items found: 1"), "got: {}", stdout);
}

#[test]
fn test_ingest_survives_unreachable_media() {
    let (_tmp, config_path) = setup_test_env();
    run_memedoc(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_memedoc(&config_path, &["ingest", "reddit", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("items: 2"), "got: {}", stdout);
    assert!(stdout.contains("fetch failures: 2"), "got: {}", stdout);
    assert!(stdout.contains("new records: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_memedoc(&config_path, &["ingest", "archive", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("Unknown or disabled source"));
}

#[test]
fn test_patterns_json_on_empty_db() {
    let (_tmp, config_path) = setup_test_env();
    run_memedoc(&config_path, &["init"]);

    let (stdout, stderr, success) = run_memedoc(&config_path, &["patterns", "--json"]);
    assert!(success, "patterns failed: {}", stderr);
    let parsed: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(parsed, serde_json::json!([]));
}

#[test]
fn test_similar_unknown_item_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_memedoc(&config_path, &["init"]);

    let (_, stderr, success) = run_memedoc(&config_path, &["similar", "reddit", "t3_missing"]);
    assert!(!success);
    assert!(stderr.contains("no fingerprint stored"));
}

#[test]
fn test_stats_and_export_on_empty_db() {
    let (tmp, config_path) = setup_test_env();
    run_memedoc(&config_path, &["init"]);

    let (stdout, stderr, success) = run_memedoc(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Fingerprints:  0"));

    let out = tmp.path().join("out/export.json");
    let (_, stderr, success) =
        run_memedoc(&config_path, &["export", "--output", out.to_str().unwrap()]);
    assert!(success, "export failed: {}", stderr);
    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(exported["count"], 0);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_memedoc(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
