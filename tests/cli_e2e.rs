//! End-to-end CLI tests for the doi-manager binary.
//!
//! Every test points `--db` and `XDG_CONFIG_HOME` into a temp directory so
//! nothing touches the real user library or config.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn doi_manager(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("doi-manager").unwrap();
    cmd.env("XDG_CONFIG_HOME", dir.path().join("config"))
        .env("XDG_DATA_HOME", dir.path().join("data"))
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.path().join("library.db"));
    cmd
}

/// Config that turns auto-retrieve off and points every service at a closed
/// local port, so no test reaches the network.
fn write_offline_config(dir: &TempDir, autoretrieve: &str) {
    let config_dir = dir.path().join("config").join("doi-manager");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        format!(
            r#"autoretrieve = "{autoretrieve}"

[services]
shortdoi_url = "http://127.0.0.1:9"
handle_url = "http://127.0.0.1:9"
crossref_url = "http://127.0.0.1:9/openurl"
connect_timeout_secs = 1
read_timeout_secs = 1
"#
        ),
    )
    .unwrap();
}

#[test]
fn test_binary_help_displays_usage() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: doi-manager"));
}

#[test]
fn test_binary_version_displays_version() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("doi-manager"));
}

#[test]
fn test_binary_requires_subcommand() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir).assert().failure();
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .args(["list", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_list_on_empty_library() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No records."));
}

#[test]
fn test_config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = not found (using defaults)"))
        .stdout(predicate::str::contains("tag_invalid = \"_Invalid DOI\""))
        .stdout(predicate::str::contains("autoretrieve = short"))
        .stdout(predicate::str::contains("crossref_url = https://www.crossref.org/openurl"));
}

#[test]
fn test_auto_retrieve_persists_mode() {
    let dir = TempDir::new().unwrap();
    doi_manager(&dir)
        .args(["auto-retrieve", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("autoretrieve = check"));

    doi_manager(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = loaded"))
        .stdout(predicate::str::contains("autoretrieve = check"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("config").join("doi-manager");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[services]\nread_timeout_secs = 0\n").unwrap();

    doi_manager(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read_timeout_secs"));
}

#[test]
fn test_add_then_list_shows_record() {
    let dir = TempDir::new().unwrap();
    write_offline_config(&dir, "none");

    doi_manager(&dir)
        .args(["add", "journalArticle", "--title", "A Paper", "--doi", "10.1000/ABC"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added record 1"));

    doi_manager(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1\tjournalArticle\t10.1000/ABC\tA Paper"));
}

#[test]
fn test_operation_with_unreachable_service_leaves_record_unchanged() {
    let dir = TempDir::new().unwrap();
    write_offline_config(&dir, "none");

    doi_manager(&dir)
        .args(["add", "journalArticle", "--doi", "10.1000/ABC"])
        .assert()
        .success();

    doi_manager(&dir)
        .args(["-q", "short", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("short: 1 records, 0 updated"))
        .stdout(predicate::str::contains("1 skipped"));

    doi_manager(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("10.1000/ABC"));
}

#[test]
fn test_malformed_doi_is_tagged_without_network() {
    let dir = TempDir::new().unwrap();
    write_offline_config(&dir, "none");

    doi_manager(&dir)
        .args(["add", "book", "--doi", "not a doi"])
        .assert()
        .success();

    doi_manager(&dir)
        .args(["-q", "check", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 invalid"));

    doi_manager(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("_Invalid DOI"));
}
