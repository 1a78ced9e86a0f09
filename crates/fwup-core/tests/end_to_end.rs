//! Package on the build side, then download and install on the device side,
//! with a local directory standing in for the static host.

use std::path::Path;
use std::sync::Arc;

use fwup_core::NullReporter;
use fwup_core::config::DeviceConfig;
use fwup_core::io::fetch::FileFetcher;
use fwup_core::packager::app::AppSpec;
use fwup_core::packager::compiler::{CompileError, Compiler};
use fwup_core::packager::variant::{PRECOMPILED_VARIANT, PrecompiledVariant, SourceVariant, Variant};
use fwup_core::packager::{Packager, PackagerOptions};
use fwup_core::revision::StaticSource;
use fwup_core::updater::{ErrorKind, Outcome, Updater};
use fwup_schema::{BranchName, Revision};
use tempfile::TempDir;

fn write_tree(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        let path = dir.path().join("app_a").join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

async fn package(source: StaticSource, variants: Vec<Arc<dyn Variant>>, out: &Path) -> bool {
    let summary = Packager::new(
        vec![AppSpec::new("app_a", "app_a")],
        Arc::new(source),
        variants,
        PackagerOptions {
            output: out.to_path_buf(),
            jobs: 2,
            clean: false,
        },
    )
    .with_reporter(Arc::new(NullReporter))
    .run()
    .await
    .unwrap();
    summary.is_success()
}

fn device(host: &Path, home: &Path) -> Updater {
    let config = DeviceConfig {
        base_url: format!("file://{}", host.join("app_a").display()),
        root: Some(home.join("app")),
        ..DeviceConfig::default()
    };
    Updater::new(&config, home, Arc::new(FileFetcher)).with_reporter(Arc::new(NullReporter))
}

#[tokio::test]
async fn packaged_revision_round_trips_to_device() {
    let input = write_tree(&[
        ("main.py", b"print(1)"),
        ("lib/deep/pump.py", b"def run():\n    pass\n"),
    ]);
    let host = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    let source = StaticSource::new().with(Revision::new("abc123", "first", "main"), input.path());
    assert!(package(source, vec![Arc::new(SourceVariant)], host.path()).await);

    let mut updater = device(host.path(), home.path());
    let branch = BranchName::new("main");
    match updater.check_and_update(&branch).await {
        Outcome::Updated { revision, variant } => {
            assert_eq!(revision, "abc123");
            assert_eq!(variant, "src");
        }
        other => panic!("expected update, got {other:?}"),
    }

    for relative in ["main.py", "lib/deep/pump.py"] {
        let expected = std::fs::read(input.path().join("app_a").join(relative)).unwrap();
        let actual = std::fs::read(home.path().join("app").join(relative)).unwrap();
        assert_eq!(actual, expected, "{relative} differs");
    }

    assert!(matches!(
        updater.check_and_update(&branch).await,
        Outcome::NoUpdate
    ));
}

#[tokio::test]
async fn newer_revision_replaces_and_prunes() {
    let host = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    let branch = BranchName::new("main");

    let v1 = write_tree(&[("main.py", b"print(1)"), ("old.py", b"gone soon")]);
    let source = StaticSource::new().with(Revision::new("aaa111", "one", "main"), v1.path());
    assert!(package(source, vec![Arc::new(SourceVariant)], host.path()).await);
    let mut updater = device(host.path(), home.path());
    assert!(matches!(
        updater.check_and_update(&branch).await,
        Outcome::Updated { .. }
    ));
    std::fs::write(home.path().join("app/config_wifi.json"), b"{}").unwrap();

    let v2 = write_tree(&[("main.py", b"print(2)")]);
    let source = StaticSource::new().with(Revision::new("bbb222", "two", "main"), v2.path());
    assert!(package(source, vec![Arc::new(SourceVariant)], host.path()).await);
    assert!(matches!(
        updater.check_and_update(&branch).await,
        Outcome::Updated { .. }
    ));

    let root = home.path().join("app");
    assert_eq!(std::fs::read(root.join("main.py")).unwrap(), b"print(2)");
    assert!(!root.join("old.py").exists());
    assert!(root.join("config_wifi.json").exists());
}

struct Broken;

impl Compiler for Broken {
    fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
        Err(CompileError::Failed {
            file: source.to_path_buf(),
            status: "exit status: 1".into(),
            stderr: "SyntaxError".into(),
        })
    }
}

#[tokio::test]
async fn failed_variant_is_never_visible_to_devices() {
    let input = write_tree(&[("main.py", b"print(")]);
    let host = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    let source = StaticSource::new().with(Revision::new("abc123", "first", "main"), input.path());
    let variants: Vec<Arc<dyn Variant>> = vec![
        Arc::new(SourceVariant),
        Arc::new(PrecompiledVariant::new(PRECOMPILED_VARIANT, Arc::new(Broken))),
    ];

    assert!(!package(source, variants, host.path()).await);
    assert!(!host.path().join("app_a/latest/main").exists());

    let mut updater = device(host.path(), home.path());
    match updater.check_and_update(&BranchName::new("main")).await {
        Outcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::Fetch),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert!(updater.installed().is_none());
}
