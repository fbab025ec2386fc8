use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::TransferError;

/// A single transfer unit as seen by the uploader.
///
/// A unit is either a plain file, a primary file with attachments that share
/// its flow identifier, or a generated archive flagged for deletion once
/// shipped. Directory units are never uploaded directly; the path analyzer
/// expands them first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Local filesystem path of the primary payload.
    pub source_path: PathBuf,
    /// Relative path the server records for this unit.
    pub target_path: String,
    /// Additional local files whose bytes are concatenated after the primary
    /// payload's last chunk.
    pub attachments: Vec<PathBuf>,
    /// Remove the source file after the final chunk is posted.
    pub delete_after: bool,
    /// Terminal error if this unit failed.
    pub error: Option<String>,
    size: i64,
    is_dir: bool,
}

impl UploadFile {
    /// Creates a unit from a user-supplied path plus optional attachments.
    ///
    /// Paths are made absolute and stat'ed up front; a missing primary or
    /// attachment is an error. For regular files the target path defaults to
    /// the file name; directory units keep an empty target until expansion.
    pub fn new(
        path: impl AsRef<Path>,
        attachments: Vec<PathBuf>,
    ) -> Result<Self, TransferError> {
        let source_path = std::path::absolute(path.as_ref())?;
        let meta = std::fs::metadata(&source_path)
            .map_err(|_| TransferError::Missing(source_path.display().to_string()))?;

        if meta.is_dir() {
            return Ok(Self {
                source_path,
                target_path: String::new(),
                attachments: Vec::new(),
                delete_after: false,
                error: None,
                size: 0,
                is_dir: true,
            });
        }

        let mut size = meta.len() as i64;
        let mut absolute_attachments = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let attachment = std::path::absolute(&attachment)?;
            let meta = std::fs::metadata(&attachment)
                .map_err(|_| TransferError::Missing(attachment.display().to_string()))?;
            size += meta.len() as i64;
            absolute_attachments.push(attachment);
        }

        let target_path = source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            source_path,
            target_path,
            attachments: absolute_attachments,
            delete_after: false,
            error: None,
            size,
            is_dir: false,
        })
    }

    /// Creates a regular-file unit with an explicit target path.
    ///
    /// Used for walked directory entries and generated archives.
    pub fn with_target(
        path: impl AsRef<Path>,
        target_path: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let source_path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&source_path)
            .map_err(|_| TransferError::Missing(source_path.display().to_string()))?;
        Ok(Self {
            source_path,
            target_path: target_path.into(),
            attachments: Vec::new(),
            delete_after: false,
            error: None,
            size: meta.len() as i64,
            is_dir: false,
        })
    }

    /// Total bytes of the primary payload plus all attachments.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Returns `true` if the source path is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Records the terminal error for this unit.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }
}

/// Per-unit progress record flowing from upload workers to the aggregator.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub file: UploadFile,
    /// Total bytes of the unit (primary + attachments).
    pub total_size: i64,
    /// Bytes accounted for so far; never exceeds `total_size`.
    pub bytes_transferred: i64,
    /// Delta since the previous record for this unit.
    pub bytes_increment: i64,
    /// Bytes per second, set only on the final record of a successful unit.
    pub transfer_rate: Option<i64>,
    /// Set iff the unit failed.
    pub error: Option<String>,
}

/// Sender-side accounting for one unit's progress records.
///
/// The holder is the only writer for its unit, so records stay totally
/// ordered without locking. A `None` channel turns all emissions into no-ops
/// (used when a unit is uploaded outside the worker pool).
pub struct UnitProgress {
    file: UploadFile,
    total_size: i64,
    transferred: i64,
    tx: Option<mpsc::Sender<TransferProgress>>,
}

impl UnitProgress {
    pub fn new(file: UploadFile, tx: Option<mpsc::Sender<TransferProgress>>) -> Self {
        Self {
            file,
            total_size: 0,
            transferred: 0,
            tx,
        }
    }

    /// Sets the unit's total size once the reader has stat'ed all parts.
    pub fn set_total(&mut self, total_size: i64) {
        self.total_size = total_size;
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    /// Accounts `bytes` more and emits a progress record.
    pub async fn add_bytes(&mut self, bytes: i64) {
        self.transferred += bytes;
        self.send(TransferProgress {
            file: self.file.clone(),
            total_size: self.total_size,
            bytes_transferred: self.transferred,
            bytes_increment: bytes,
            transfer_rate: None,
            error: None,
        })
        .await;
    }

    /// Emits the final record of a successful unit.
    pub async fn complete(&mut self, transfer_rate: i64) {
        self.transferred = self.total_size;
        self.send(TransferProgress {
            file: self.file.clone(),
            total_size: self.total_size,
            bytes_transferred: self.transferred,
            bytes_increment: 0,
            transfer_rate: Some(transfer_rate),
            error: None,
        })
        .await;
    }

    /// Records the unit's terminal error and emits a failure record.
    pub async fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.file.mark_failed(error.clone());
        self.send(TransferProgress {
            file: self.file.clone(),
            total_size: self.total_size,
            bytes_transferred: self.transferred,
            bytes_increment: 0,
            transfer_rate: None,
            error: Some(error),
        })
        .await;
    }

    async fn send(&self, progress: TransferProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(progress).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn new_file_unit_sizes_primary_and_attachments() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("scan.dat");
        let att1 = dir.path().join("scan.lab");
        let att2 = dir.path().join("scan.raw");
        fs::write(&primary, vec![0u8; 100]).unwrap();
        fs::write(&att1, vec![0u8; 10]).unwrap();
        fs::write(&att2, vec![0u8; 20]).unwrap();

        let unit = UploadFile::new(&primary, vec![att1, att2]).unwrap();
        assert_eq!(unit.size(), 130);
        assert!(!unit.is_dir());
        assert_eq!(unit.target_path, "scan.dat");
        assert_eq!(unit.attachments.len(), 2);
    }

    #[test]
    fn new_directory_unit() {
        let dir = TempDir::new().unwrap();
        let unit = UploadFile::new(dir.path(), vec![]).unwrap();
        assert!(unit.is_dir());
        assert!(unit.target_path.is_empty());
    }

    #[test]
    fn new_missing_primary_fails() {
        let err = UploadFile::new("/nonexistent/file.bin", vec![]).unwrap_err();
        assert!(matches!(err, TransferError::Missing(_)));
    }

    #[test]
    fn new_missing_attachment_fails() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("scan.dat");
        fs::write(&primary, b"DATA").unwrap();

        let err =
            UploadFile::new(&primary, vec![dir.path().join("missing.lab")]).unwrap_err();
        assert!(matches!(err, TransferError::Missing(_)));
    }

    #[test]
    fn with_target_keeps_explicit_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("level1.dat");
        fs::write(&file, vec![0u8; 15]).unwrap();

        let unit = UploadFile::with_target(&file, "data/levels/level1.dat").unwrap();
        assert_eq!(unit.target_path, "data/levels/level1.dat");
        assert_eq!(unit.size(), 15);
    }

    #[tokio::test]
    async fn unit_progress_accounting() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, vec![0u8; 8]).unwrap();
        let unit = UploadFile::new(&file, vec![]).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut progress = UnitProgress::new(unit, Some(tx));
        progress.set_total(8);

        progress.add_bytes(5).await;
        progress.add_bytes(3).await;
        progress.complete(1024).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.bytes_transferred, 5);
        assert_eq!(first.bytes_increment, 5);
        assert!(first.transfer_rate.is_none());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.bytes_transferred, 8);
        assert_eq!(second.bytes_increment, 3);

        let last = rx.recv().await.unwrap();
        assert_eq!(last.bytes_transferred, 8);
        assert_eq!(last.bytes_increment, 0);
        assert_eq!(last.transfer_rate, Some(1024));
        assert!(last.error.is_none());
    }

    #[tokio::test]
    async fn unit_progress_failure_record() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, b"X").unwrap();
        let unit = UploadFile::new(&file, vec![]).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut progress = UnitProgress::new(unit, Some(tx));
        progress.set_total(1);
        progress.fail("chunk rejected").await;

        let record = rx.recv().await.unwrap();
        assert_eq!(record.error.as_deref(), Some("chunk rejected"));
        assert_eq!(record.file.error.as_deref(), Some("chunk rejected"));
        assert_eq!(record.bytes_increment, 0);
    }

    #[tokio::test]
    async fn unit_progress_without_channel_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, b"X").unwrap();
        let unit = UploadFile::new(&file, vec![]).unwrap();

        let mut progress = UnitProgress::new(unit, None);
        progress.set_total(1);
        progress.add_bytes(1).await;
        progress.complete(0).await;
        // Nothing to assert beyond "does not panic / block".
    }
}
