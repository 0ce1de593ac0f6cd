//! Update artifact download
//!
//! - `source`: HTTP probe and streamed transfer behind the [`UpdateSource`] seam
//! - `core`: streaming a transfer to disk with the free-space guard
//! - `background`: the download task started alongside the updater
//! - `space`: free-space queries
//! - `progress`: progress sampling

pub mod background;
pub mod core;
pub mod progress;
pub mod source;
pub mod space;

pub use self::background::{BackgroundDownload, DownloadStatus};
pub use self::core::{
    DownloadResult, PendingDownload, SPACE_HEADROOM, download, resolve_destination,
    start_download,
};
pub use self::progress::DownloadProgress;
pub use self::source::{HttpSource, RemoteMetadata, Transfer, UpdateSource};
pub use self::space::{DiskSpace, SystemDiskSpace};
