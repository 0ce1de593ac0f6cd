//! The update engine: background download plus the triggered update run
//!
//! [`Updater`] owns one standing background download and runs one update per
//! [`Updater::trigger`]. Triggers are not serialized here; the host calls one
//! at a time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheDetails, CacheStore, InstanceIdentity, default_cache_root};
use crate::config::UpdaterConfig;
use crate::detection::{UpdateCheck, check_for_update};
use crate::download::{
    BackgroundDownload, DiskSpace, DownloadResult, HttpSource, SystemDiskSpace, UpdateSource,
    resolve_destination, start_download,
};
use crate::error::{ConfigError, DownloadError, StartError, UninstallError, UpdateError};
use crate::install::{
    CommandRunner, InstallerLocation, NativeRegistry, ShellRunner, UninstallRegistry,
    UninstallSummary, install, locate, uninstall_matching,
};
use crate::state_machine::{Event, Lifecycle, Phase};

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn UpdateSource>,
    pub disk: Arc<dyn DiskSpace>,
    pub registry: Arc<dyn UninstallRegistry>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Collaborators {
    /// HTTP, the local volume, the machine registry and the platform shell.
    pub fn native() -> Result<Self, reqwest::Error> {
        Ok(Self {
            source: Arc::new(HttpSource::new()?),
            disk: Arc::new(SystemDiskSpace),
            registry: Arc::new(NativeRegistry),
            runner: Arc::new(ShellRunner),
        })
    }
}

/// Result of a successful install
#[derive(Debug)]
pub struct InstallReport {
    pub installer: PathBuf,
    /// Uninstall step result; an error here did not abort the run
    pub uninstall: Result<UninstallSummary, UninstallError>,
    /// Combined installer output
    pub output: String,
}

/// Successful end of a triggered run
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The installed artifact is current; nothing was uninstalled or installed
    NoUpdateNeeded,
    Installed(InstallReport),
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::NoUpdateNeeded => f.write_str("no update needed"),
            UpdateOutcome::Installed(report) => {
                write!(f, "installed {}", report.installer.display())
            }
        }
    }
}

/// Builder for [`Updater`]
pub struct UpdaterBuilder {
    identity: InstanceIdentity,
    config: UpdaterConfig,
    collaborators: Option<Collaborators>,
    cache_root: Option<PathBuf>,
}

impl UpdaterBuilder {
    pub fn identity(mut self, identity: InstanceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Replace the native collaborators.
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Root under which the per-instance cache directory lives.
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Validate the configuration and start the background download.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<Updater, StartError> {
        self.config.validate()?;

        let collaborators = match self.collaborators {
            Some(collaborators) => collaborators,
            None => Collaborators::native()?,
        };
        let root = self.cache_root.unwrap_or_else(default_cache_root);
        let store = CacheStore::new(self.identity.cache_dir_in(&root));

        let ctx = Arc::new(RunContext {
            config: self.config,
            collaborators,
            store,
        });
        let background = spawn_background(Arc::clone(&ctx));

        info!(
            "updater {} started, cache at {}",
            self.identity.name,
            ctx.store.dir().display()
        );
        Ok(Updater {
            identity: self.identity,
            ctx,
            background,
            phase: Phase::Idle,
        })
    }
}

/// Configuration, collaborators and cache for one configuration generation
struct RunContext {
    config: UpdaterConfig,
    collaborators: Collaborators,
    store: CacheStore,
}

impl RunContext {
    async fn check(&self) -> UpdateCheck {
        let cached = self.store.read();
        check_for_update(&*self.collaborators.source, &self.config, &cached).await
    }

    /// Download the configured artifact and record it as fetched but not installed.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<DownloadResult, DownloadError> {
        let dest = resolve_destination(self.config.download_destination.as_deref(), self.store.dir());
        let source = &*self.collaborators.source;
        let disk = &*self.collaborators.disk;

        let pending = start_download(source, disk, &self.config.download_url, &dest, cancel).await?;
        let partial = pending.path().to_path_buf();

        let result = match pending.finish(disk, cancel).await {
            Ok(result) => result,
            Err(e) => {
                remove_file_logged(&partial);
                return Err(e);
            }
        };

        let details = CacheDetails {
            download_url: self.config.download_url.clone(),
            content_length: result.content_length,
            etag: result.etag.clone(),
            installed: false,
        };
        if let Err(e) = self.store.write(&details) {
            warn!("error saving cache details: {e}");
        }
        Ok(result)
    }

    /// Locate, uninstall and install. Blocking; payload files are removed on every path.
    fn install_stage(
        &self,
        payload: &DownloadResult,
        lifecycle: &mut Lifecycle,
    ) -> Result<InstallReport, UpdateError> {
        let location = match locate(&payload.path, self.config.installer_path()) {
            Ok(location) => location,
            Err(e) => {
                remove_file_logged(&payload.path);
                return Err(e.into());
            }
        };
        lifecycle.step(Event::InstallerFound);

        let result = self.uninstall_then_install(&location, lifecycle);

        location.cleanup();
        remove_file_logged(&payload.path);
        result
    }

    fn uninstall_then_install(
        &self,
        location: &InstallerLocation,
        lifecycle: &mut Lifecycle,
    ) -> Result<InstallReport, UpdateError> {
        let registry = &*self.collaborators.registry;
        let runner = &*self.collaborators.runner;

        let uninstall = match self.config.registry_lookup() {
            Some((key, value)) => uninstall_matching(registry, runner, key, value),
            None => Ok(UninstallSummary::Disabled),
        };
        let uninstall = match uninstall {
            Err(e) if self.config.abort_on_uninstall_errors => return Err(e.into()),
            Err(e) => {
                warn!("continuing with install despite uninstall errors: {e}");
                Err(e)
            }
            ok => ok,
        };
        lifecycle.step(Event::UninstallFinished);

        let output = install(runner, &location.installer, &self.config.install_args)?;
        lifecycle.step(Event::Installed);

        Ok(InstallReport {
            installer: location.installer.clone(),
            uninstall,
            output,
        })
    }
}

fn spawn_background(ctx: Arc<RunContext>) -> BackgroundDownload {
    BackgroundDownload::spawn(move |cancel| async move {
        let check = tokio::select! {
            _ = cancel.cancelled() => return None,
            check = ctx.check() => check,
        };
        let UpdateCheck::Required(reason) = check else {
            info!("no update needed");
            return None;
        };

        info!("starting background download: {reason}");
        match ctx.fetch(&cancel).await {
            Ok(result) => Some(result),
            Err(DownloadError::Cancelled) => {
                info!("background download cancelled");
                None
            }
            Err(e) => {
                warn!("background download failed: {e}");
                None
            }
        }
    })
}

/// The update engine for one instance
pub struct Updater {
    identity: InstanceIdentity,
    ctx: Arc<RunContext>,
    background: BackgroundDownload,
    phase: Phase,
}

impl Updater {
    /// Builder for the default instance with `config`.
    pub fn builder(config: UpdaterConfig) -> UpdaterBuilder {
        UpdaterBuilder {
            identity: InstanceIdentity::named("default"),
            config,
            collaborators: None,
            cache_root: None,
        }
    }

    #[inline]
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    #[inline]
    pub fn config(&self) -> &UpdaterConfig {
        &self.ctx.config
    }

    #[inline]
    pub fn cache(&self) -> &CacheStore {
        &self.ctx.store
    }

    /// Whether the background download has settled
    #[inline]
    pub fn download_complete(&self) -> bool {
        self.background.is_complete()
    }

    /// Phase reached by the current or most recent run
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the change detector against the persisted record.
    pub async fn check(&self) -> UpdateCheck {
        self.ctx.check().await
    }

    /// Run one update: wait for the background download, re-evaluate,
    /// then locate, uninstall and install.
    ///
    /// `cancel` aborts the wait and any inline download. Once the install
    /// stage has started it runs to completion.
    pub async fn trigger(&mut self, cancel: &CancellationToken) -> Result<UpdateOutcome, UpdateError> {
        let mut lifecycle = Lifecycle::default();
        lifecycle.step(Event::Triggered);

        let result = self.run(&mut lifecycle, cancel).await;
        match &result {
            Ok(outcome) => info!("update run finished: {outcome}"),
            Err(e) => {
                let phase = lifecycle.phase();
                lifecycle.step(Event::Fail);
                error!("update failed while {phase}: {e}");
            }
        }

        self.phase = lifecycle.phase();
        result
    }

    async fn run(
        &self,
        lifecycle: &mut Lifecycle,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, UpdateError> {
        if !self.background.wait(cancel).await {
            return Err(UpdateError::Cancelled {
                phase: Phase::AwaitingDownload,
            });
        }
        lifecycle.step(Event::DownloadSettled);
        let background_payload = self.background.take_payload();

        let check = tokio::select! {
            _ = cancel.cancelled() => None,
            check = self.ctx.check() => Some(check),
        };
        let reason = match check {
            None => {
                discard_payload(background_payload.as_ref());
                return Err(UpdateError::Cancelled {
                    phase: Phase::Evaluating,
                });
            }
            Some(UpdateCheck::UpToDate) => {
                discard_payload(background_payload.as_ref());
                lifecycle.step(Event::UpToDate);
                info!("no update needed");
                return Ok(UpdateOutcome::NoUpdateNeeded);
            }
            Some(UpdateCheck::Required(reason)) => reason,
        };
        info!("update required: {reason}");

        let reusable = match background_payload {
            Some(payload)
                if reason.keeps_payload()
                    && payload.source_url == self.ctx.config.download_url
                    && payload.path.is_file() =>
            {
                Some(payload)
            }
            other => {
                discard_payload(other.as_ref());
                None
            }
        };
        lifecycle.step(Event::UpdateRequired {
            payload_ready: reusable.is_some(),
        });

        let payload = match reusable {
            Some(payload) => {
                info!("using downloaded update {}", payload.path.display());
                payload
            }
            None => {
                let payload = self.ctx.fetch(cancel).await.map_err(|e| match e {
                    DownloadError::Cancelled => UpdateError::Cancelled {
                        phase: Phase::Downloading,
                    },
                    other => other.into(),
                })?;
                lifecycle.step(Event::PayloadFetched);
                payload
            }
        };

        // Installers are never interrupted, so this stage ignores `cancel`
        let ctx = Arc::clone(&self.ctx);
        let stage_payload = payload.clone();
        let mut stage_lifecycle = lifecycle.clone();
        let (stage_lifecycle, report) = tokio::task::spawn_blocking(move || {
            let report = ctx.install_stage(&stage_payload, &mut stage_lifecycle);
            (stage_lifecycle, report)
        })
        .await?;
        *lifecycle = stage_lifecycle;
        let report = report?;

        let details = CacheDetails {
            download_url: self.ctx.config.download_url.clone(),
            content_length: payload.content_length,
            etag: payload.etag,
            installed: true,
        };
        if let Err(e) = self.ctx.store.write(&details) {
            error!("error saving cache details: {e}");
        }

        Ok(UpdateOutcome::Installed(report))
    }

    /// Replace the configuration and restart the background download.
    ///
    /// The running background task is cancelled and awaited first; a payload
    /// it produced but nobody used is removed.
    pub async fn reconfigure(&mut self, config: UpdaterConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let unused = self.background.shutdown().await;
        discard_payload(unused.as_ref());

        self.ctx = Arc::new(RunContext {
            config,
            collaborators: self.ctx.collaborators.clone(),
            store: self.ctx.store.clone(),
        });
        self.background = spawn_background(Arc::clone(&self.ctx));
        self.phase = Phase::Idle;

        info!("configuration replaced, background download restarted");
        Ok(())
    }

    /// Stop the background download and wait for it to exit.
    pub async fn close(mut self) {
        let unused = self.background.shutdown().await;
        discard_payload(unused.as_ref());
        info!("updater {} closed", self.identity.name);
    }
}

fn discard_payload(payload: Option<&DownloadResult>) {
    if let Some(payload) = payload {
        info!("discarding downloaded update {}", payload.path.display());
        remove_file_logged(&payload.path);
    }
}

fn remove_file_logged(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", path.display()),
    }
}
