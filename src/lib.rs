//! Android Debug Bridge client core.
//!
//! Two pieces of an ADB client that need exact handling of device output:
//!
//! - [`sync`]: the file sync service (stat, list, pull, push) spoken over a
//!   channel that has already switched to `sync:`. Anything implementing
//!   `AsyncRead + AsyncWrite + Unpin` works as the channel.
//! - [`process`]: parsing of `/proc/[pid]/stat` records as returned by
//!   `cat` on the device.
//!
//! ```no_run
//! use adbsync::{SyncService, CancellationToken};
//!
//! # async fn demo(stream: tokio::io::DuplexStream) -> adbsync::Result<()> {
//! let mut sync = SyncService::new(stream);
//!
//! let stat = sync.stat("/system/build.prop").await?;
//! println!("{} bytes, modified {}", stat.size, stat.time);
//!
//! let cancel = CancellationToken::new();
//! let mut buf = Vec::new();
//! sync.pull("/system/build.prop", &mut buf, &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod process;
pub mod sync;

pub use config::SyncConfig;
pub use error::{AdbError, Result};
pub use process::{AndroidProcess, AndroidProcessState};
pub use sync::{
    CancellationToken, DirectoryListing, FilePermissions, FileStatistics, FileType, SyncProgress,
    SyncService,
};
