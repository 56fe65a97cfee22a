use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askbase_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askbase");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/askbase.sqlite"

[retrieval]
threshold = 0.7
mode = "single-best"

[assistant]
name = "Aria"
support_contact = "support@example.com"

[server]
bind = "127.0.0.1:7349"
"#,
        root.display()
    );

    let config_path = config_dir.join("askbase.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("seed.toml"),
        r#"
[[organizations]]
id = 1
name = "Acme"

[[articles]]
id = 1
organization_id = 1
title = "Refund Policy"
content = "Refunds are accepted within 30 days."
"#,
    )
    .unwrap();

    fs::write(
        root.join("seed_questions.toml"),
        r#"
[[questions]]
id = 10
organization_id = 1
text = "What is your refund policy?"
"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run_askbase(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = askbase_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askbase binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_askbase(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/askbase.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_askbase(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_askbase(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_articles_without_embeddings() {
    let (tmp, config_path) = setup_test_env();
    let seed = tmp.path().join("seed.toml");

    let (stdout, stderr, success) =
        run_askbase(&config_path, &["import", seed.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("organizations: 1"));
    assert!(stdout.contains("articles: 1"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_import_questions_errors_when_embeddings_disabled() {
    let (tmp, config_path) = setup_test_env();
    let seed = tmp.path().join("seed_questions.toml");

    let (_, stderr, success) = run_askbase(&config_path, &["import", seed.to_str().unwrap()]);
    assert!(!success, "import should fail with embeddings disabled");
    assert!(
        stderr.contains("disabled"),
        "expected a disabled-provider error, got: {}",
        stderr
    );
}

#[test]
fn test_ask_with_disabled_model_returns_structured_failure() {
    let (_tmp, config_path) = setup_test_env();
    run_askbase(&config_path, &["init"]);

    let (stdout, stderr, success) = run_askbase(
        &config_path,
        &["ask", "What is your refund policy?", "--session", "s1", "--org", "1"],
    );
    assert!(success, "ask must not crash: stdout={}, stderr={}", stdout, stderr);

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["success"], false);
    assert!(value["message"]
        .as_str()
        .unwrap()
        .starts_with("Internal error:"));
}

#[test]
fn test_failed_ask_is_audited() {
    let (_tmp, config_path) = setup_test_env();
    run_askbase(&config_path, &["init"]);
    run_askbase(
        &config_path,
        &["ask", "Do you ship abroad?", "--session", "s-audit", "--org", "1"],
    );

    let (stdout, stderr, success) = run_askbase(&config_path, &["logs", "--org", "1", "--json"]);
    assert!(success, "logs failed: stdout={}, stderr={}", stdout, stderr);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["session_id"], "s-audit");
    assert_eq!(entries[0]["question"], "Do you ship abroad?");
}

#[test]
fn test_logs_empty_organization() {
    let (_tmp, config_path) = setup_test_env();
    run_askbase(&config_path, &["init"]);

    let (stdout, _, success) = run_askbase(&config_path, &["logs", "--org", "42"]);
    assert!(success);
    assert!(stdout.contains("No log entries"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n[embedding]\nprovider = \"magic\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_askbase(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"));
}
