use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn paperlens_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_paperlens"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("paper.md"),
        "Abstract\nWidgets improve throughput.\n\n1 Introduction\nWe study widgets.",
    )
    .unwrap();

    let config_content = format!(
        r#"[artifacts]
dir = "{}/artifacts"
max_age_secs = 60

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );

    let config_path = config_dir.join("paperlens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_paperlens(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = paperlens_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run paperlens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn age_file(path: &Path, by: Duration) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[test]
fn test_outline_prints_graph() {
    let (tmp, config_path) = setup_test_env();
    let outline = tmp.path().join("outline.md");
    fs::write(&outline, "- A\n  - B\n    - C\n  - D").unwrap();

    let (stdout, stderr, success) =
        run_paperlens(&config_path, &["outline", outline.to_str().unwrap()]);
    assert!(success, "outline failed: stdout={}, stderr={}", stdout, stderr);

    let graph: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["A", "B", "C", "D"]);

    let edges: Vec<(String, String)> = graph["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["source"].as_str().unwrap().to_string(),
                e["target"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        edges,
        vec![
            ("A".to_string(), "B".to_string()),
            ("B".to_string(), "C".to_string()),
            ("A".to_string(), "D".to_string()),
        ]
    );
}

#[test]
fn test_outline_without_bullets_uses_summary() {
    let (tmp, config_path) = setup_test_env();
    let outline = tmp.path().join("empty.md");
    fs::write(&outline, "").unwrap();

    let (stdout, stderr, success) = run_paperlens(
        &config_path,
        &[
            "outline",
            outline.to_str().unwrap(),
            "--summary",
            "Widgets improve throughput. See details.",
        ],
    );
    assert!(success, "outline failed: stderr={}", stderr);

    let graph: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["nodes"][0]["label"], "Widgets improve throughput");
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);
}

#[test]
fn test_outline_works_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let outline = tmp.path().join("outline.md");
    fs::write(&outline, "- X\n- X\n- X").unwrap();

    let (stdout, _, success) = run_paperlens(
        &tmp.path().join("missing.toml"),
        &["outline", outline.to_str().unwrap()],
    );
    assert!(success);
    let graph: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let nodes = graph["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| n["label"] == "X"));
    assert_ne!(nodes[0]["id"], nodes[1]["id"]);
    assert_ne!(nodes[1]["id"], nodes[2]["id"]);
}

#[test]
fn test_sweep_removes_only_aged_files() {
    let (tmp, config_path) = setup_test_env();
    let artifacts = tmp.path().join("artifacts");
    fs::create_dir_all(&artifacts).unwrap();
    let stale = artifacts.join("stale.pdf");
    let fresh = artifacts.join("fresh.pdf");
    fs::write(&stale, "old").unwrap();
    fs::write(&fresh, "new").unwrap();
    age_file(&stale, Duration::from_secs(3600));

    let (stdout, stderr, success) = run_paperlens(&config_path, &["sweep"]);
    assert!(success, "sweep failed: stderr={}", stderr);
    assert!(stdout.contains("Removed 1 file(s)"), "stdout={}", stdout);
    assert!(!stale.exists());
    assert!(fresh.exists());
}

#[test]
fn test_sweep_help_warns_about_running_server() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_paperlens(&config_path, &["sweep", "--help"]);
    assert!(success, "sweep --help failed: stderr={}", stderr);
    assert!(stdout.contains("running server"), "stdout={}", stdout);
    assert!(stdout.contains("no server is using"), "stdout={}", stdout);
}

#[test]
fn test_load_with_embeddings_disabled_fails_cleanly() {
    let (tmp, config_path) = setup_test_env();
    let paper = tmp.path().join("files").join("paper.md");

    let (_, stderr, success) = run_paperlens(
        &config_path,
        &["load", paper.to_str().unwrap(), "--query", "widgets"],
    );
    assert!(!success);
    assert!(stderr.contains("embedding unavailable"), "stderr={}", stderr);

    // The staged copy is purged, not left for the sweeper.
    let leftover = fs::read_dir(tmp.path().join("artifacts")).unwrap().count();
    assert_eq!(leftover, 0);
}
