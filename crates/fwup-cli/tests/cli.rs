//! Integration tests for the `fwup` command-line binary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use fwup_core::packager::archive::write_package;
use fwup_core::packager::publish::publish_latest;
use fwup_core::packager::variant::SourceVariant;
use fwup_schema::{BranchName, Revision};
use tempfile::TempDir;

/// A device home plus a local directory acting as the static host.
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
    host: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".fwup");
        let host = temp_dir.path().join("web_downloads");
        std::fs::create_dir_all(&home).expect("failed to create fwup home");
        Self {
            temp_dir,
            home,
            host,
        }
    }

    fn fwup(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_fwup"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("FWUP_HOME", &self.home);
        for var in ["FWUP_BASE_URL", "FWUP_STATE_DIR", "FWUP_DOWNLOAD_DIR", "RUST_LOG"] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn base_url(&self) -> String {
        format!("file://{}", self.host.join("app_a").display())
    }

    /// Package `files` as `revision` and point `main` at it.
    fn publish(&self, revision: &str, files: &[(&str, &str)]) {
        let tree = TempDir::new().unwrap();
        let mut names = Vec::new();
        for (name, content) in files {
            std::fs::write(tree.path().join(name), content).unwrap();
            names.push((*name).to_string());
        }
        names.sort();

        let app_out = self.host.join("app_a");
        let revision = Revision::new(revision, "Jo <jo@example.com>: change", "main");
        let built =
            write_package(&app_out, "app_a", &SourceVariant, &revision, tree.path(), &names)
                .unwrap();
        let tars = BTreeMap::from([(built.variant, built.entry)]);
        publish_latest(&app_out, &BranchName::new("main"), &revision, tars).unwrap();
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.fwup().arg("--help").output().expect("failed to run fwup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_status_on_fresh_device() {
    let ctx = TestContext::new();
    let output = ctx.fwup().arg("status").output().expect("failed to run fwup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("nothing yet"), "{stdout}");
}

#[test]
fn test_check_without_base_url_fails() {
    let ctx = TestContext::new();
    let output = ctx.fwup().arg("check").output().expect("failed to run fwup");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("base_url"), "{stderr}");
}

#[test]
fn test_check_installs_then_reports_up_to_date() {
    let ctx = TestContext::new();
    ctx.publish("abc123", &[("main.py", "print(1)")]);

    let output = ctx
        .fwup()
        .args(["check", "--base-url", ctx.base_url().as_str()])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        std::fs::read_to_string(ctx.home.join("app/main.py")).unwrap(),
        "print(1)"
    );

    let state = std::fs::read(ctx.home.join("state/installed.json")).unwrap();
    let state: serde_json::Value = serde_json::from_slice(&state).unwrap();
    assert_eq!(state["manifest"]["commit_sha"], "abc123");

    let output = ctx
        .fwup()
        .args(["check", "--base-url", ctx.base_url().as_str()])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("up to date"), "{stdout}");
}

#[test]
fn test_quiet_check_prints_nothing_on_success() {
    let ctx = TestContext::new();
    ctx.publish("abc123", &[("main.py", "print(1)")]);

    let output = ctx
        .fwup()
        .args(["check", "--quiet", "--base-url", ctx.base_url().as_str()])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.is_empty(), "{}", String::from_utf8_lossy(&output.stdout));
    assert!(ctx.home.join("app/main.py").exists());
}

#[test]
fn test_state_and_download_dirs_from_env() {
    let ctx = TestContext::new();
    ctx.publish("abc123", &[("main.py", "print(1)")]);
    let state_dir = ctx.temp_dir.path().join("data/state");
    let download_dir = ctx.temp_dir.path().join("data/incoming");

    let output = ctx
        .fwup()
        .env("FWUP_STATE_DIR", &state_dir)
        .env("FWUP_DOWNLOAD_DIR", &download_dir)
        .args(["check", "--base-url", ctx.base_url().as_str()])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(state_dir.join("installed.json").is_file());
    assert!(!ctx.home.join("state/installed.json").exists());
    assert!(!download_dir.join("abc123.tar").exists());
}

#[test]
fn test_dry_run_does_not_install() {
    let ctx = TestContext::new();
    ctx.publish("abc123", &[("main.py", "print(1)")]);

    let output = ctx
        .fwup()
        .env("FWUP_BASE_URL", ctx.base_url())
        .args(["check", "--dry-run"])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("update available"), "{stdout}");
    assert!(!ctx.home.join("app").exists());
}

#[test]
fn test_run_stops_after_cycle_limit() {
    let ctx = TestContext::new();
    let output = ctx
        .fwup()
        .args([
            "run",
            "--cycles",
            "1",
            "--base-url",
            ctx.base_url().as_str(),
        ])
        .output()
        .expect("failed to run fwup");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cycle limit reached"), "{stdout}");
}
