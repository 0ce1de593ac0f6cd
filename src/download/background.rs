//! Background download task with an observable completion flag

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::core::DownloadResult;

/// How often [`BackgroundDownload::wait`] reports that it is still waiting
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Running,
    /// Finished, with the payload if one was fetched and not yet taken
    Settled(Option<DownloadResult>),
}

impl DownloadStatus {
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(self, DownloadStatus::Settled(_))
    }
}

/// A download task running alongside the updater.
///
/// The task always settles, including when it fails, panics or is cancelled;
/// waiters never block on a task that is gone. Dropping the handle cancels the
/// task.
pub struct BackgroundDownload {
    status: Arc<watch::Sender<DownloadStatus>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundDownload {
    /// Spawn `task` on the current tokio runtime.
    ///
    /// The closure receives the token that [`shutdown`](Self::shutdown) cancels.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Option<DownloadResult>> + Send + 'static,
    {
        let (tx, _rx) = watch::channel(DownloadStatus::Running);
        let status = Arc::new(tx);
        let cancel = CancellationToken::new();

        let work = task(cancel.clone());
        let guard = SettleOnDrop(Arc::clone(&status));
        let handle = tokio::spawn(async move {
            let payload = work.await;
            guard.settle(payload);
        });

        Self {
            status,
            cancel,
            handle: Some(handle),
        }
    }

    /// Whether the task has settled
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.status.borrow().is_settled()
    }

    /// Wait for the task to settle. Returns `false` if `cancel` fired first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.status.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                res = tokio::time::timeout(WAIT_POLL_INTERVAL, settled(&mut rx)) => {
                    if res.is_ok() {
                        return true;
                    }
                    info!("waiting for download to complete...");
                }
            }
        }
    }

    /// Take the downloaded payload, leaving the task settled with none.
    pub fn take_payload(&self) -> Option<DownloadResult> {
        let mut taken = None;
        self.status.send_if_modified(|status| match status {
            DownloadStatus::Settled(payload) => {
                taken = payload.take();
                taken.is_some()
            }
            DownloadStatus::Running => false,
        });
        taken
    }

    /// Cancel the task, wait for it to exit and return any unconsumed payload.
    pub async fn shutdown(&mut self) -> Option<DownloadResult> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("background download task ended abnormally: {e}");
            }
        }
        self.take_payload()
    }
}

impl Drop for BackgroundDownload {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn settled(rx: &mut watch::Receiver<DownloadStatus>) {
    // Err means the sender is gone, which only happens once we are dropped
    let _ = rx.wait_for(DownloadStatus::is_settled).await;
}

/// Marks the task settled even if its future panics or is aborted
struct SettleOnDrop(Arc<watch::Sender<DownloadStatus>>);

impl SettleOnDrop {
    fn settle(self, payload: Option<DownloadResult>) {
        self.0.send_replace(DownloadStatus::Settled(payload));
    }
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        self.0.send_if_modified(|status| {
            if status.is_settled() {
                false
            } else {
                *status = DownloadStatus::Settled(None);
                true
            }
        });
    }
}
