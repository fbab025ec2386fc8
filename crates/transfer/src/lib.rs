//! Transfer units, chunk planning, and checksums for the bulk uploader.
//!
//! A *unit* is one logical file addressed by a single flow identifier: a
//! primary payload plus optional attachments whose bytes ride on the unit's
//! final chunk. This crate knows nothing about HTTP; it produces chunks and
//! progress records for the upload engine to ship.

mod chunked;
mod rate;
mod types;

pub use chunked::{ChunkPlan, UnitChunk, UnitReader, sha1_file, sha256_bytes, sha256_file};
pub use rate::RateEstimator;
pub use types::{TransferProgress, UnitProgress, UploadFile};

/// Upload chunk size: 100 MiB.
///
/// Files below this size are candidates for zip batching; files at or above
/// it are streamed in chunks of exactly this many bytes.
pub const UPLOAD_CHUNK_SIZE: usize = 100 * 1024 * 1024;

/// Chunks larger than this get synthetic once-per-second progress while the
/// POST is outstanding. Smaller chunks finish fast enough that a single
/// increment on completion suffices.
pub const FAKE_PROGRESS_THRESHOLD: usize = 5 * 1024 * 1024;

/// Seed for the per-worker transfer-rate estimate: 5 MiB/s.
pub const INITIAL_TRANSFER_RATE: i64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("the file \"{0}\" does not exist")]
    Missing(String),
}
