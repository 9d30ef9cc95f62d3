//! Instrument wire protocol.

pub mod frame;
pub mod transfer;

// Re-export common types
pub use frame::{ACK, Command, ESC, UPLOAD_END, build_command, checksum, send_command, verify_checksum};
pub use transfer::{
    AckTimeoutPolicy, ChecksumMismatch, ChecksumPolicy, DownloadReport, MAX_BLOCKS, TransferOptions,
    UploadReport, download, upload,
};
