//! Zip batching: pack small files into STORE-method archives sized for the
//! chunk uploader.

use std::path::{Path, PathBuf};

use agora_transfer::UploadFile;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{ImportError, MAX_ZIP_SIZE, MIN_ZIP_SIZE};

/// Builds zip archives from the analyzer's zip list and feeds each finished
/// archive into the upload work channel as a delete-after unit.
///
/// Entries are stored uncompressed so the on-disk size tracks the input
/// bytes and the CPU stays out of the way. An archive is closed once it
/// grows past the hard limit, or past the soft limit while the work channel
/// is empty (idle workers beat bigger archives).
pub struct ZipBatcher {
    temp_dir: PathBuf,
    producer_id: usize,
    max_zip_size: i64,
    min_zip_size: i64,
}

impl ZipBatcher {
    /// Creates a batcher with the standard size limits.
    pub fn new(temp_dir: impl Into<PathBuf>, producer_id: usize) -> Self {
        Self::with_limits(temp_dir, producer_id, MAX_ZIP_SIZE, MIN_ZIP_SIZE)
    }

    /// Creates a batcher with explicit size limits.
    pub fn with_limits(
        temp_dir: impl Into<PathBuf>,
        producer_id: usize,
        max_zip_size: i64,
        min_zip_size: i64,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            producer_id,
            max_zip_size,
            min_zip_size,
        }
    }

    /// Packs `files` into archives and sends each one on `work_tx`.
    ///
    /// Returns the number of archives produced. An I/O error aborts this
    /// batcher; archives already sent stay in flight.
    pub async fn run(
        &self,
        files: Vec<UploadFile>,
        work_tx: &mpsc::Sender<UploadFile>,
    ) -> Result<usize, ImportError> {
        let mut index = 0;
        let mut archives = 0;

        while index < files.len() {
            let archive_name = format!("upload_{}_{}.agora_upload", self.producer_id, index);
            let archive_path = self.temp_dir.join(&archive_name);

            let slice = files[index..].to_vec();
            let path = archive_path.clone();
            let (max, min) = (self.max_zip_size, self.min_zip_size);
            let probe_tx = work_tx.clone();
            let consumed = tokio::task::spawn_blocking(move || {
                build_archive(&path, &slice, max, min, &probe_tx)
            })
            .await??;

            index += consumed;
            archives += 1;

            let mut archive = UploadFile::with_target(&archive_path, &archive_name)?;
            archive.delete_after = true;
            debug!(
                archive = %archive_name,
                files = consumed,
                bytes = archive.size(),
                "archive closed"
            );
            work_tx
                .send(archive)
                .await
                .map_err(|_| ImportError::PoolClosed)?;
        }

        Ok(archives)
    }
}

/// Writes one archive starting at the head of `files`; returns how many
/// entries it consumed.
fn build_archive(
    path: &Path,
    files: &[UploadFile],
    max_zip_size: i64,
    min_zip_size: i64,
    work_tx: &mpsc::Sender<UploadFile>,
) -> Result<usize, ImportError> {
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    let mut consumed = 0;
    for unit in files {
        writer.start_file(unit.target_path.as_str(), options)?;
        let mut source = std::fs::File::open(&unit.source_path)?;
        std::io::copy(&mut source, &mut writer)?;
        consumed += 1;

        let size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
        if size > max_zip_size {
            break;
        }
        // Opportunistic cut: the archive is big enough and the workers have
        // nothing queued.
        if size > min_zip_size && work_tx.capacity() == work_tx.max_capacity() {
            break;
        }
    }

    writer.finish()?;
    Ok(consumed)
}
