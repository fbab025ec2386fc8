//! Concurrent, chunked bulk upload into an Agora import package.
//!
//! This crate implements the import engine: the caller hands a list of
//! files, attachment groups, and directories to [`ImportPackage::upload`],
//! which partitions them (small files are batched into STORE-method zip
//! archives, large files and attachment groups stream directly), ships every
//! unit as a sequence of checksummed multipart chunks through a small worker
//! pool, and aggregates progress onto an event channel. Afterwards the
//! lifecycle calls drive the server-side state machine:
//!
//! 1. [`ImportPackage::complete`] seals the package (optionally with a JSON
//!    import manifest)
//! 2. [`ImportPackage::wait_for_import`] polls until the server finishes
//! 3. [`ImportPackage::result`] fetches the server's datafile report and
//!    reconciles it against what was submitted
//!
//! A failed chunk fails its unit and nothing else; per-unit failures are
//! reported through [`UploadEvent::UploadError`] and the final
//! reconciliation, not as an `upload` error.

pub mod analyzer;
pub mod batcher;
mod coordinator;
pub mod events;
mod lifecycle;
mod package;
pub mod uploader;

#[cfg(test)]
pub(crate) mod testsupport;

pub use analyzer::{AnalyzedPaths, analyze_paths};
pub use batcher::ZipBatcher;
pub use events::{UploadEvent, UploadSummary};
pub use lifecycle::{IMPORT_POLL_INTERVAL, ImportReconciliation};
pub use package::ImportPackage;
pub use uploader::ChunkUploader;

use agora_client::ClientError;
use agora_transfer::TransferError;

/// Number of chunk-upload workers (and of zip producers when the zip list is
/// large enough to split).
pub const PARALLEL_UPLOADS: usize = 3;

/// Hard upper bound for one zip archive: 1 GiB.
pub const MAX_ZIP_SIZE: i64 = 1024 * 1024 * 1024;

/// An archive may be cut early once it exceeds 50 MiB and the upload workers
/// are starved.
pub const MIN_ZIP_SIZE: i64 = 50 * 1024 * 1024;

/// Below this many batchable files, zipping is skipped entirely.
pub const ZIPPED_UPLOAD_THRESHOLD: usize = 5;

/// Errors produced by the import engine.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("the path \"{0}\" does not exist")]
    PathMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chunk rejected with http status {0}")]
    ChunkRejected(u16),

    #[error("the \"complete\" request was invalid. http status = {0}")]
    CompleteRejected(u16),

    #[error("import progress timeout")]
    ProgressTimeout,

    #[error("cannot read the upload results. Please update Agora to the newest version")]
    ResultUnparseable,

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("the upload worker pool shut down early")]
    PoolClosed,
}
