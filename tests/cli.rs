use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const SNAPSHOT: &str = r#"<html><body><div role="main"><h3>Feed posts</h3><div>
    <div><h4><a href="/ads"><span>Acme Corp</span></a></h4><span>Sponsored</span><div dir="auto">Buy the new Acme widget today, limited offer for everyone.</div></div>
    <div><h4><a href="/jane"><span>Jane Doe</span></a></h4><span>Suggested for you</span><div dir="auto">Our bakery just opened a second shop downtown, come by.</div></div>
    <div><h4><a href="/sam"><span>Sam Lee</span></a></h4><span>3h</span><div dir="auto">Spent the weekend hiking along the coast with friends.</div></div>
</div></div></body></html>"#;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("feed-clarity").expect("binary built");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn prints_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Feed Clarity"))
        .stdout(predicate::str::contains("--settings"));
}

#[test]
fn missing_snapshot_is_a_usage_error() {
    cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing snapshot path"));
}

#[test]
fn filters_a_snapshot() {
    let dir = tempdir().unwrap();
    let snapshot = dir.path().join("feed.html");
    fs::write(&snapshot, SNAPSHOT).unwrap();
    let config = dir.path().join("config.yaml");
    fs::write(&config, "log:\n  level: error\n").unwrap();

    let output = cmd()
        .arg("--config")
        .arg(&config)
        .arg("--settings")
        .arg(dir.path().join("settings.db"))
        .arg(&snapshot)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let posts = report["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0]["category"], "sponsored");
    assert_eq!(posts[0]["action"], "hidden");
    assert_eq!(posts[1]["category"], "suggested");
    assert_eq!(posts[1]["action"], "hidden");
    assert_eq!(posts[2]["author"], "Sam Lee");
    assert_eq!(posts[2]["action"], "approved");
    assert_eq!(report["stats"]["totalPosts"], 1);
    assert_eq!(report["stats"]["featuresEnabled"], 6);
    assert!(dir.path().join("settings.db").exists());
}

#[test]
fn unreadable_snapshot_fails() {
    let dir = tempdir().unwrap();
    cmd()
        .arg("--settings")
        .arg(dir.path().join("settings.db"))
        .arg(dir.path().join("absent.html"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("read snapshot"));
}
