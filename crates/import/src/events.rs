//! Externally visible upload events.

use agora_protocol::ImportProgressRecord;
use agora_transfer::{TransferProgress, UploadFile};

/// Counters emitted once after path analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Files that will be batched into zip archives.
    pub files_to_zip: usize,
    /// Estimated number of archives the batchers will produce.
    pub zip_files: usize,
    /// Units that stream directly.
    pub files_to_upload: usize,
    /// Progress denominator: payload bytes plus archive-entry overhead.
    pub total_size: i64,
}

/// One event on the caller's progress sink.
///
/// Every progress type carries its own payload so consumers can match
/// without downcasting.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Path analysis finished.
    UploadInitialized(UploadSummary),
    /// The upload run began for a package.
    UploadStarted { package_id: i64 },
    /// A worker picked up a unit.
    FileUploadStarted { file: UploadFile },
    /// Byte-level progress for one unit.
    FileProgress(TransferProgress),
    /// A unit finished successfully.
    FileUploadCompleted { file: UploadFile },
    /// Aggregated percentage, capped at 99 until the run completes.
    Progress { percent: i32 },
    /// A unit failed terminally.
    UploadError { file: UploadFile },
    /// All workers drained; the run is over.
    UploadCompleted { package_id: i64 },
    /// One poll result while waiting for the server-side import.
    ImportProgress(ImportProgressRecord),
    /// Files processed during result reconciliation.
    ResultProgress { processed: usize, total: usize },
}
