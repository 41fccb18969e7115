//! ADB sync service.
//!
//! File stat, directory listing, pull and push over a channel that has already
//! switched to `sync:`.
//!
//! # Exchanges
//!
//! ```text
//! STAT <path>            -> STAT mode size mtime | FAIL
//! LIST <path>            -> DENT ... DENT DONE   | FAIL
//! RECV <path>            -> DATA ... DATA DONE   | FAIL
//! SEND <path>,<mode>
//!   DATA ... DATA
//!   DONE <mtime>         -> OKAY                 | FAIL
//! ```

pub mod progress;
pub mod protocol;
pub mod service;
pub mod stat;

pub use progress::{CancellationToken, SyncProgress};

pub use protocol::{
    encode_header, encode_request, read_frame, write_frame, write_request, BodyLayout, Frame,
    SyncCommand, MAX_CHUNK_SIZE, MAX_FRAME_SIZE, MAX_PATH_LENGTH,
};

pub use service::{DirectoryListing, SyncService};
pub use stat::{decode_dent, decode_stat, FilePermissions, FileStatistics, FileType};
