use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rbh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rbh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let runbooks = root.join("runbooks");
    fs::create_dir_all(&runbooks).unwrap();
    fs::write(
        runbooks.join("cpu.md"),
        "[Alerting] High CPU Usage alert\nКак реагировать: restart service X\n",
    )
    .unwrap();
    fs::write(
        runbooks.join("payments.md"),
        "Payments gateway\n\nZ735 Payment queue backlog\nHow to respond: scale the payment workers to 6 replicas\n\nZ736 Payment latency\nHow to respond: check the card processor status page\n",
    )
    .unwrap();
    fs::write(
        runbooks.join("disk.txt"),
        "Disk usage guide\nGeneral notes about disks, volumes and cleanup of old log files.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rbh.sqlite"

[store]
base_path = "{root}/data/collections"

[server]
bind = "127.0.0.1:7341"

[log]
level = "warn"

[[agents]]
tenant_id = 1
agent_id = 5
name = "oncall"
prompt = "Answer only from the documentation."

[[agents]]
tenant_id = 1
agent_id = 6
name = "retired"
prompt = "unused"
active = false
"#,
        root = root.display()
    );

    let config_path = config_dir.join("rbh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rbh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rbh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rbh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest(config_path: &Path) {
    let runbooks = config_path.parent().unwrap().parent().unwrap().join("runbooks");
    let (stdout, stderr, success) = run_rbh(
        config_path,
        &["ingest", "1", "5", runbooks.to_str().unwrap()],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_extract_needs_no_config() {
    let (stdout, stderr, success) = run_rbh(
        Path::new("/nonexistent/rbh.toml"),
        &["extract", "[Alerting] High CPU Usage alert firing\nz735 backlog\nMetrics: cpu_load"],
    );
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("High CPU Usage"));
    assert!(stdout.contains("z735"));
    assert!(stdout.contains("cpu_load"));
}

#[test]
fn test_ingest_reports_documents() {
    let (_tmp, config_path) = setup_test_env();
    let runbooks = config_path.parent().unwrap().parent().unwrap().join("runbooks");

    let (stdout, stderr, success) = run_rbh(
        &config_path,
        &["ingest", "1", "5", runbooks.to_str().unwrap()],
    );
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("ingested 3 documents into 1/5"));
    assert!(stdout.contains("cpu.md"));
}

#[test]
fn test_ingest_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);
    ingest(&config_path);

    let (stdout, _, success) = run_rbh(&config_path, &["stats", "1", "5"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"), "stats: {}", stdout);
}

#[test]
fn test_analyze_first_line_match_is_verbatim() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_rbh(
        &config_path,
        &["analyze", "1", "5", "[Alerting] High CPU Usage alert firing at 10:00"],
    );
    assert!(success, "analyze failed: {}", stderr);
    assert_eq!(stdout.trim(), "restart service X");
}

#[test]
fn test_analyze_full_text_match_uses_matched_section() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_rbh(
        &config_path,
        &["analyze", "1", "5", "Z736 Payment latency alert is firing", "--json"],
    );
    assert!(success, "analyze failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["match_type"], "full_text");
    assert_eq!(json["response"], "check the card processor status page");
}

#[test]
fn test_analyze_empty_collection_not_found() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rbh(&config_path, &["analyze", "1", "5", "z999 unknown spike"]);
    assert!(success, "analyze failed: {}", stderr);
    assert_eq!(stdout.trim(), "Alert not found in documentation");
}

#[test]
fn test_analyze_semantic_with_disabled_completion_returns_error_text() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_rbh(
        &config_path,
        &["analyze", "1", "5", "volumes are filling up with old log files", "--json"],
    );
    assert!(success, "analyze failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["match_type"], "semantic");
    assert_eq!(
        json["response"],
        "An error occurred while processing the request: completion provider is disabled"
    );
}

#[test]
fn test_analyze_rejects_unknown_and_inactive_agents() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rbh(&config_path, &["analyze", "9", "9", "z1 thing"]);
    assert!(!success);
    assert!(stderr.contains("Agent not found"));

    let (_, stderr, success) = run_rbh(&config_path, &["analyze", "1", "6", "z1 thing"]);
    assert!(!success);
    assert!(stderr.contains("Agent is inactive"));
}

#[test]
fn test_collections_are_isolated() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_rbh(&config_path, &["match", "2", "5", "[Alerting] High CPU Usage alert"]);
    assert!(success);
    assert!(stdout.contains("No matches."));

    let (stdout, _, success) = run_rbh(&config_path, &["match", "1", "5", "[Alerting] High CPU Usage alert"]);
    assert!(success);
    assert!(stdout.contains("[first_line] cpu.md"), "match: {}", stdout);
}

#[test]
fn test_drop_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_rbh(&config_path, &["drop", "1", "5"]);
    assert!(success, "drop failed: {}", stderr);
    assert!(stdout.contains("dropped collection 1/5"));

    let (_, _, success) = run_rbh(&config_path, &["drop", "1", "5"]);
    assert!(success, "second drop should succeed");

    let (stdout, _, _) = run_rbh(&config_path, &["stats", "1", "5"]);
    assert!(stdout.contains("Documents:   0"));
}

#[test]
fn test_logs_record_analyses() {
    let (_tmp, config_path) = setup_test_env();
    run_rbh(&config_path, &["analyze", "1", "5", "z999 unknown spike"]);

    let (stdout, stderr, success) = run_rbh(&config_path, &["logs"]);
    assert!(success, "logs failed: {}", stderr);
    assert!(stdout.contains("1/5"));
    assert!(stdout.contains("z999 unknown spike"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[retrieval]\nresult_count = 0\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_rbh(&config_path, &["stats", "1", "5"]);
    assert!(!success);
    assert!(stderr.contains("result_count"));
}

#[test]
fn test_completions() {
    let (stdout, _, success) = run_rbh(Path::new("/nonexistent/rbh.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("rbh"));
}
