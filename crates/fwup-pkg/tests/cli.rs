//! Integration tests for the `fwup-pkg` command-line binary.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn fwup_pkg() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fwup-pkg"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("FWUP_COMPILER");
    cmd
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Jo")
        .env("GIT_AUTHOR_EMAIL", "jo@example.com")
        .env("GIT_COMMITTER_NAME", "Jo")
        .env("GIT_COMMITTER_EMAIL", "jo@example.com")
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

/// A repository with one app on branch `main`.
fn repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let app = dir.path().join("app_a");
    std::fs::create_dir_all(app.join("lib")).unwrap();
    std::fs::write(app.join("app_package.toml"), "[package]\nname = \"app_a\"\n").unwrap();
    std::fs::write(app.join("main.py"), "print(1)").unwrap();
    std::fs::write(app.join("lib/pump.py"), "run()").unwrap();
    std::fs::write(app.join("notes.txt"), "not packaged").unwrap();

    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["add", "."]);
    git(dir.path(), &["commit", "-q", "-m", "first"]);
    dir
}

#[test]
fn test_help_command() {
    let output = fwup_pkg().arg("--help").output().expect("failed to run fwup-pkg");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}

#[test]
fn test_hash_command() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("abc.txt");
    std::fs::write(&file, "abc").unwrap();

    let output = fwup_pkg().arg("hash").arg(&file).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad 3 "),
        "{stdout}"
    );
}

#[test]
fn test_build_apps_and_inspect() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let repo = repo();
    let out = TempDir::new().unwrap();

    let output = fwup_pkg().args(["apps", "--repo"]).arg(repo.path()).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("app_a"));

    let output = fwup_pkg()
        .args(["build", "--no-precompiled", "--jobs", "2", "--repo"])
        .arg(repo.path())
        .arg("--output")
        .arg(out.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let app_out = out.path().join("app_a");
    assert!(app_out.join("latest/main").is_file());
    assert!(out.path().join("index.html").is_file());
    let tar = std::fs::read_dir(app_out.join("src"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    let output = fwup_pkg().arg("inspect").arg(&tar).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lib/pump.py"), "{stdout}");
    assert!(stdout.contains("config_package_manifest.json"), "{stdout}");
    assert!(!stdout.contains("notes.txt"), "{stdout}");
}

#[test]
fn test_missing_compiler_is_reported() {
    if !git_available() {
        return;
    }
    let repo = repo();
    let out = TempDir::new().unwrap();

    let output = fwup_pkg()
        .args(["build", "--compiler", "definitely-not-a-compiler", "--repo"])
        .arg(repo.path())
        .arg("--output")
        .arg(out.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--no-precompiled"));
    assert!(!out.path().join("app_a/latest/main").exists());
}
