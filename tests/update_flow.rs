mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use autoupdated::error::{ExtractError, InstallError, LocateError};
use autoupdated::install::UninstallSummary;
use autoupdated::{
    CacheStore, InstanceIdentity, Phase, UpdateError, UpdateOutcome, Updater, UpdaterConfig,
};
use common::{FakeRegistry, FakeSource, RecordingRunner, URL, collaborators, settle, zip_bytes};

const INSTALLER: &[u8] = b"@echo off\r\necho installing\r\n";

struct Harness {
    dir: tempfile::TempDir,
    source: Arc<FakeSource>,
    runner: Arc<RecordingRunner>,
}

impl Harness {
    fn new(runner: RecordingRunner) -> Self {
        let body = zip_bytes(&[("pkg/install.bat", INSTALLER)], 10 * 1024);
        Self {
            dir: tempfile::tempdir().unwrap(),
            source: FakeSource::serving("app.zip", body, "\"v1\""),
            runner: Arc::new(runner),
        }
    }

    fn downloads(&self) -> std::path::PathBuf {
        self.dir.path().join("downloads")
    }

    fn config(&self) -> UpdaterConfig {
        let mut config = UpdaterConfig::new(URL);
        config.download_destination = Some(self.downloads());
        config.installer_path = Some("pkg/install.bat".to_string());
        config
    }

    fn store(&self) -> CacheStore {
        CacheStore::new(
            InstanceIdentity::named("test").cache_dir_in(&self.dir.path().join("cache")),
        )
    }

    fn start(&self, config: UpdaterConfig, registry: FakeRegistry) -> Updater {
        Updater::builder(config)
            .identity(InstanceIdentity::named("test"))
            .cache_root(self.dir.path().join("cache"))
            .collaborators(collaborators(
                self.source.clone(),
                registry,
                self.runner.clone(),
            ))
            .start()
            .unwrap()
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn zip_payload_is_installed_and_cleaned_up() {
    let h = Harness::new(RecordingRunner::default());
    let mut updater = h.start(h.config(), FakeRegistry::default());

    let outcome = updater.trigger(&CancellationToken::new()).await.unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install");
    };
    assert_eq!(report.installer, h.downloads().join("app").join("pkg/install.bat"));
    assert_eq!(report.output, "installer output");
    assert!(matches!(report.uninstall, Ok(UninstallSummary::Disabled)));
    assert_eq!(updater.phase(), Phase::Done);

    let cached = h.store().read();
    assert!(cached.installed);
    assert_eq!(cached.download_url, URL);
    assert_eq!(cached.etag, "\"v1\"");
    assert!(cached.content_length > 10 * 1024);

    assert!(!h.downloads().join("app.zip").exists());
    assert!(!h.downloads().join("app").exists());
    assert!(is_empty_dir(&h.downloads()));

    // The background payload was reused rather than fetched again
    assert_eq!(h.source.gets(), 1);
    assert_eq!(h.runner.programs().len(), 1);

    updater.close().await;
}

#[tokio::test]
async fn retrigger_after_install_needs_no_update() {
    let h = Harness::new(RecordingRunner::default());
    let mut updater = h.start(h.config(), FakeRegistry::default());
    let cancel = CancellationToken::new();

    assert!(matches!(
        updater.trigger(&cancel).await.unwrap(),
        UpdateOutcome::Installed(_)
    ));
    assert!(matches!(
        updater.trigger(&cancel).await.unwrap(),
        UpdateOutcome::NoUpdateNeeded
    ));
    assert_eq!(updater.phase(), Phase::Done);
    assert_eq!(h.runner.programs().len(), 1);
    assert_eq!(h.source.gets(), 1);
    updater.close().await;

    // A fresh engine over the same cache does not download at all
    let mut restarted = h.start(h.config(), FakeRegistry::default());
    settle(&restarted).await;
    assert!(matches!(
        restarted.trigger(&cancel).await.unwrap(),
        UpdateOutcome::NoUpdateNeeded
    ));
    assert_eq!(h.source.gets(), 1);
    assert_eq!(h.runner.programs().len(), 1);
    restarted.close().await;
}

#[tokio::test]
async fn forced_install_reinstalls_unchanged_artifact() {
    let h = Harness::new(RecordingRunner::default());
    let mut config = h.config();
    config.force_install = true;
    config.install_args = vec!["/S".to_string(), "/norestart".to_string()];
    let mut updater = h.start(config, FakeRegistry::default());
    let cancel = CancellationToken::new();

    updater.trigger(&cancel).await.unwrap();
    updater.trigger(&cancel).await.unwrap();

    let programs = h.runner.programs();
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[1].1, vec!["/S", "/norestart"]);
    // Second run had no background payload left and downloaded inline
    assert_eq!(h.source.gets(), 2);
    updater.close().await;
}

#[tokio::test]
async fn changed_artifact_replaces_stale_background_payload() {
    let h = Harness::new(RecordingRunner::default());
    let mut updater = h.start(h.config(), FakeRegistry::default());
    settle(&updater).await;

    let v2 = zip_bytes(&[("pkg/install.bat", INSTALLER)], 12 * 1024);
    h.source.publish(v2, "\"v2\"");

    updater.trigger(&CancellationToken::new()).await.unwrap();

    assert_eq!(h.source.gets(), 2);
    let cached = h.store().read();
    assert!(cached.installed);
    assert_eq!(cached.etag, "\"v2\"");
    assert!(is_empty_dir(&h.downloads()));
    updater.close().await;
}

#[tokio::test]
async fn failed_uninstall_does_not_block_install_by_default() {
    let h = Harness::new(RecordingRunner::default());
    let mut config = h.config();
    config.registry_lookup_key = Some("DisplayName".to_string());
    config.registry_lookup_value = Some("Contoso App".to_string());
    let registry = FakeRegistry::default().with_entry(
        "ContosoApp",
        &[
            ("DisplayName", "Contoso App"),
            ("UninstallString", "C:\\Contoso\\fail-uninstall.exe"),
        ],
    );
    let mut updater = h.start(config, registry);

    let outcome = updater.trigger(&CancellationToken::new()).await.unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install");
    };
    let failures = report.uninstall.unwrap_err().failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(h.runner.lines().len(), 1);
    assert_eq!(h.runner.programs().len(), 1);
    updater.close().await;
}

#[tokio::test]
async fn failed_uninstall_aborts_when_configured() {
    let h = Harness::new(RecordingRunner::default());
    let mut config = h.config();
    config.registry_lookup_key = Some("DisplayName".to_string());
    config.registry_lookup_value = Some("Contoso App".to_string());
    config.abort_on_uninstall_errors = true;
    let registry = FakeRegistry::default().with_entry(
        "ContosoApp",
        &[
            ("DisplayName", "Contoso App"),
            ("QuietUninstallString", "fail-uninstall.exe /S"),
        ],
    );
    let mut updater = h.start(config, registry);

    let err = updater.trigger(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, UpdateError::Uninstall(_)));
    assert_eq!(updater.phase(), Phase::Failed);
    assert!(h.runner.programs().is_empty());
    assert!(!h.store().read().installed);
    assert!(is_empty_dir(&h.downloads()));
    updater.close().await;
}

#[tokio::test]
async fn all_matching_installations_are_uninstalled() {
    let h = Harness::new(RecordingRunner::default());
    let mut config = h.config();
    config.registry_lookup_key = Some("Publisher".to_string());
    config.registry_lookup_value = Some("Contoso".to_string());
    config.abort_on_uninstall_errors = true;
    let registry = FakeRegistry::default()
        .with_entry(
            "{11111111-AAAA}",
            &[
                ("Publisher", "Contoso"),
                ("UninstallString", "MsiExec.exe /X{11111111-AAAA}"),
            ],
        )
        .with_entry(
            "Fabrikam",
            &[("Publisher", "Fabrikam"), ("UninstallString", "fabrikam.exe")],
        )
        .with_entry(
            "ContosoLegacy",
            &[("Publisher", "Contoso"), ("UninstallString", "fail-legacy.exe")],
        );
    let mut updater = h.start(config, registry);

    let outcome = updater.trigger(&CancellationToken::new()).await.unwrap();

    let UpdateOutcome::Installed(report) = outcome else {
        panic!("expected an install");
    };
    match report.uninstall.unwrap() {
        UninstallSummary::Uninstalled { count, failures } => {
            assert_eq!(count, 1);
            assert_eq!(failures.len(), 1);
        }
        other => panic!("unexpected uninstall summary: {other:?}"),
    }
    assert_eq!(
        h.runner.lines(),
        vec!["MsiExec.exe /X{11111111-AAAA} /quiet", "fail-legacy.exe"]
    );
    assert_eq!(h.runner.programs().len(), 1);
    updater.close().await;
}

#[tokio::test]
async fn install_failure_is_reported_and_cache_stays_uninstalled() {
    let h = Harness::new(RecordingRunner::failing_installs());
    let mut updater = h.start(h.config(), FakeRegistry::default());

    let err = updater.trigger(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Install(InstallError::Failed {
            code: Some(1603),
            ..
        })
    ));
    assert_eq!(updater.phase(), Phase::Failed);
    assert!(!h.store().read().installed);
    assert!(is_empty_dir(&h.downloads()));
    updater.close().await;
}

#[tokio::test]
async fn missing_installer_fails_before_uninstall() {
    let h = Harness::new(RecordingRunner::default());
    let mut config = h.config();
    config.installer_path = Some("pkg/setup.exe".to_string());
    config.registry_lookup_key = Some("DisplayName".to_string());
    config.registry_lookup_value = Some("App".to_string());
    let registry = FakeRegistry::default()
        .with_entry("App", &[("DisplayName", "App"), ("UninstallString", "app.exe")]);
    let mut updater = h.start(config, registry);
    settle(&updater).await;
    let before = h.store().read();

    let err = updater.trigger(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Locate(LocateError::NotAtConfiguredPath { .. })
    ));
    assert_eq!(updater.phase(), Phase::Failed);
    assert!(h.runner.lines().is_empty());
    assert!(h.runner.programs().is_empty());
    assert!(is_empty_dir(&h.downloads()));
    assert_eq!(h.store().read(), before);
    updater.close().await;
}

#[tokio::test]
async fn zip_slip_payload_fails_without_side_effects() {
    let h = Harness::new(RecordingRunner::default());
    h.source.publish(
        zip_bytes(&[("pkg/install.bat", INSTALLER), ("../../evil.exe", b"MZ")], 1024),
        "\"slip\"",
    );
    let mut updater = h.start(h.config(), FakeRegistry::default());
    settle(&updater).await;
    let before = h.store().read();

    let err = updater.trigger(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Extract(ExtractError::PathTraversal { ref entry, .. }) if entry == "../../evil.exe"
    ));
    assert_eq!(updater.phase(), Phase::Failed);
    assert!(h.runner.programs().is_empty());
    assert!(!h.dir.path().join("evil.exe").exists());
    assert!(is_empty_dir(&h.downloads()));
    assert_eq!(h.store().read(), before);
    assert!(!before.installed);
    updater.close().await;
}

#[tokio::test]
async fn cancelled_wait_fails_the_run() {
    let h = Harness::new(RecordingRunner::default());
    h.source.stall_downloads();
    let mut updater = h.start(h.config(), FakeRegistry::default());

    let cancel = CancellationToken::new();
    let trigger_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger_cancel.cancel();
    });

    let err = updater.trigger(&cancel).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Cancelled {
            phase: Phase::AwaitingDownload
        }
    ));
    assert_eq!(updater.phase(), Phase::Failed);
    assert!(!updater.download_complete());

    // Closing cancels the hung background download
    updater.close().await;
    assert!(h.runner.programs().is_empty());
}

#[tokio::test]
async fn reconfigure_restarts_background_download() {
    let h = Harness::new(RecordingRunner::default());
    let mut updater = h.start(h.config(), FakeRegistry::default());
    settle(&updater).await;
    assert_eq!(h.source.gets(), 1);

    let mut config = h.config();
    config.download_url = "https://mirror.example.com/app.zip".to_string();
    updater.reconfigure(config).await.unwrap();
    settle(&updater).await;
    assert_eq!(h.source.gets(), 2);

    updater.trigger(&CancellationToken::new()).await.unwrap();

    let cached = h.store().read();
    assert_eq!(cached.download_url, "https://mirror.example.com/app.zip");
    assert!(cached.installed);
    assert_eq!(h.source.gets(), 2);
    updater.close().await;
}

#[tokio::test]
async fn invalid_reconfiguration_is_rejected() {
    let h = Harness::new(RecordingRunner::default());
    let mut updater = h.start(h.config(), FakeRegistry::default());

    let mut config = h.config();
    config.registry_lookup_key = Some("DisplayName".to_string());
    assert!(updater.reconfigure(config).await.is_err());
    assert_eq!(updater.config().download_url, URL);
    updater.close().await;
}
