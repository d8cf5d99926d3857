use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cvekb_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cvekb"))
}

fn feed_item(id: &str, description: &str, score: f64, cwe: &str) -> serde_json::Value {
    json!({
        "cve": {
            "CVE_data_meta": { "ID": id, "ASSIGNER": "cve@mitre.org" },
            "problemtype": { "problemtype_data": [{ "description": [{ "lang": "en", "value": cwe }] }] },
            "description": { "description_data": [{ "lang": "en", "value": description }] }
        },
        "impact": { "baseMetricV3": { "cvssV3": { "baseScore": score } } },
        "publishedDate": "2024-02-01T12:00Z",
        "lastModifiedDate": "2024-02-03T12:00Z"
    })
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let feeds_dir = root.join("data/json");
    fs::create_dir_all(&feeds_dir).unwrap();
    fs::write(
        feeds_dir.join("nvdcve-1.1-2024.json"),
        json!({
            "CVE_data_type": "CVE",
            "CVE_Items": [
                feed_item("CVE-2024-0002", "Stored XSS in\ncomment field", 6.1, "CWE-79"),
                feed_item("CVE-2024-0001", "SQL injection in login", 9.8, "CWE-89"),
            ]
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        feeds_dir.join("nvdcve-1.1-2023.json"),
        json!({ "CVE_Items": [feed_item("CVE-2023-0100", "Buffer overflow", 7.5, "CWE-120")] })
            .to_string(),
    )
    .unwrap();
    fs::write(feeds_dir.join("notes.txt"), "not a feed").unwrap();

    let config_content = format!(
        r#"[feeds]
input_dir = "{root}/data/json"
output_dir = "{root}/data/filtered"

[graph]
path = "{root}/results/graph_store.kg"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("cvekb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cvekb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cvekb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cvekb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_normalize_writes_compressed_files() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cvekb(&config_path, &["normalize"]);
    assert!(success, "normalize failed: {}", stderr);
    assert!(stdout.contains("files written: 2"));
    assert!(stdout.contains("records: 3"));
    assert!(stdout.contains("representative: CVE-2024-0001"));
    assert!(stdout.trim_end().ends_with("ok"));

    let out = tmp.path().join("data/filtered/compressed-nvdcve-1.1-2024.json");
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
    let first = &written["CVEs"][0];
    assert_eq!(first["cve_id"], "CVE-2024-0002");
    assert_eq!(first["impact_score"], 6.1);
    assert_eq!(first["problemtype_descriptions"], json!(["CWE-79"]));
    assert!(!tmp.path().join("data/filtered/compressed-notes.txt").exists());
}

#[test]
fn test_build_saves_graph() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cvekb(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("files failed: 0"));
    assert!(stdout.trim_end().ends_with("ok"));
    assert!(tmp.path().join("results/graph_store.kg").exists());
}

#[test]
fn test_build_is_repeatable() {
    let (_tmp, config_path) = setup_test_env();

    let (first, _, ok1) = run_cvekb(&config_path, &["build"]);
    let (second, _, ok2) = run_cvekb(&config_path, &["build"]);
    assert!(ok1 && ok2);
    let graph_line = |s: &str| s.lines().find(|l| l.contains("graph:")).map(str::to_string);
    assert_eq!(graph_line(&first), graph_line(&second));
}

#[test]
fn test_bad_feed_does_not_abort() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("data/json/broken.json"), "{\"CVE_Items\": 42}").unwrap();

    let (stdout, stderr, success) = run_cvekb(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("files failed: 1"));
    assert!(stdout
        .lines()
        .any(|l| l.trim_start().starts_with("failed:") && l.contains("broken.json")));
    assert!(stdout.contains("documents: 3"));
}

#[test]
fn test_graph_stats_and_show() {
    let (_tmp, config_path) = setup_test_env();
    run_cvekb(&config_path, &["build"]);

    let (stdout, stderr, success) = run_cvekb(&config_path, &["graph", "stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Vulnerabilities:  3"));
    assert!(stdout.contains("problem_type"));

    let (stdout, stderr, success) = run_cvekb(&config_path, &["graph", "show", "CVE-2024-0002"]);
    assert!(success, "show failed: {}", stderr);
    assert!(stdout.contains("Stored XSS in comment field"));
    assert!(stdout.contains("CVE-2024-0002 has_impact 6.1"));
    assert!(stdout.contains("CVE-2024-0002 problem_type CWE-79"));
}

#[test]
fn test_graph_show_missing_identifier() {
    let (_tmp, config_path) = setup_test_env();
    run_cvekb(&config_path, &["build"]);

    let (_stdout, stderr, success) = run_cvekb(&config_path, &["graph", "show", "CVE-1999-0001"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_graph_diff_against_itself() {
    let (tmp, config_path) = setup_test_env();
    run_cvekb(&config_path, &["build"]);
    let graph = tmp.path().join("results/graph_store.kg");

    let (stdout, stderr, success) =
        run_cvekb(&config_path, &["graph", "diff", graph.to_str().unwrap()]);
    assert!(success, "diff failed: {}", stderr);
    assert!(stdout.contains("identical"));
}

#[test]
fn test_foreign_graph_file_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    fs::create_dir_all(tmp.path().join("results")).unwrap();
    fs::write(
        tmp.path().join("results/graph_store.kg"),
        b"\x80\x04\x95\x00\x00 definitely a pickle, not a graph file",
    )
    .unwrap();

    let (_stdout, stderr, success) = run_cvekb(&config_path, &["graph", "stats"]);
    assert!(!success);
    assert!(stderr.contains("invalid graph file"));
}

#[test]
fn test_ask_requires_chat_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_cvekb(&config_path, &["build"]);

    let (_stdout, stderr, success) = run_cvekb(&config_path, &["ask", "What is CVE-2024-0001?"]);
    assert!(!success);
    assert!(stderr.contains("Chat provider is disabled"));
}

#[test]
fn test_invalid_config_is_reported() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[retrieval]\ntop_n = 0\n").unwrap();

    let (_stdout, stderr, success) = run_cvekb(&bad, &["build"]);
    assert!(!success);
    assert!(stderr.contains("top_n"));
}

#[test]
fn test_rag_rejects_zero_top_n() {
    let (_tmp, config_path) = setup_test_env();

    let (_stdout, stderr, success) =
        run_cvekb(&config_path, &["rag", "how much do cats sleep", "--top-n", "0"]);
    assert!(!success);
    assert!(stderr.contains("--top-n must be >= 1"));
}
