//! Orchestration phases and their transition function
//!
//! The updater walks one run through these phases. `Failed` is absorbing and
//! reachable from every non-terminal phase; `Done` covers both a real install
//! and the "no update needed" short circuit.

use std::fmt;

/// Phase of a single orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingDownload,
    Evaluating,
    Downloading,
    Locating,
    Uninstalling,
    Installing,
    Done,
    Failed,
}

/// Inputs that move a run between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Triggered,
    DownloadSettled,
    UpToDate,
    /// An update is needed; `payload_ready` says whether a local payload can be used as-is.
    UpdateRequired { payload_ready: bool },
    PayloadFetched,
    InstallerFound,
    UninstallFinished,
    Installed,
    Fail,
}

impl Phase {
    /// Next phase for `event`, or `None` when the event is not valid here.
    pub fn next(self, event: Event) -> Option<Phase> {
        use Event as E;
        use Phase as P;

        match (self, event) {
            (P::Done | P::Failed, _) => None,
            (P::Idle, E::Fail) => None,
            (_, E::Fail) => Some(P::Failed),
            (P::Idle, E::Triggered) => Some(P::AwaitingDownload),
            (P::AwaitingDownload, E::DownloadSettled) => Some(P::Evaluating),
            (P::Evaluating, E::UpToDate) => Some(P::Done),
            (P::Evaluating, E::UpdateRequired { payload_ready: true }) => Some(P::Locating),
            (P::Evaluating, E::UpdateRequired { payload_ready: false }) => Some(P::Downloading),
            (P::Downloading, E::PayloadFetched) => Some(P::Locating),
            (P::Locating, E::InstallerFound) => Some(P::Uninstalling),
            (P::Uninstalling, E::UninstallFinished) => Some(P::Installing),
            (P::Installing, E::Installed) => Some(P::Done),
            _ => None,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingDownload => "awaiting download",
            Phase::Evaluating => "evaluating",
            Phase::Downloading => "downloading",
            Phase::Locating => "locating installer",
            Phase::Uninstalling => "uninstalling",
            Phase::Installing => "installing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase of one run and logs every transition.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl Lifecycle {
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply `event`. Invalid events leave the phase unchanged and are logged.
    pub fn step(&mut self, event: Event) -> Phase {
        match self.phase.next(event) {
            Some(next) if next.is_terminal() => {
                log::info!("update run finished: {} -> {}", self.phase, next);
                self.phase = next;
            }
            Some(next) => {
                log::debug!("update phase: {} -> {}", self.phase, next);
                self.phase = next;
            }
            None => {
                log::warn!("ignoring {:?} while {}", event, self.phase);
            }
        }
        self.phase
    }
}
