//! Path analysis: expand directories and split inputs into stream-upload
//! and zip-batch lists.
//!
//! Relative target paths use `/` as separator (even on Windows) and never
//! carry a leading slash.

use std::path::Path;

use agora_transfer::{UPLOAD_CHUNK_SIZE, UploadFile};
use tracing::debug;

use crate::events::UploadSummary;
use crate::{ImportError, MAX_ZIP_SIZE, ZIPPED_UPLOAD_THRESHOLD};

/// Approximate per-entry archive overhead added to the progress denominator.
const ZIP_ENTRY_OVERHEAD: i64 = 150;

/// Result of path analysis: two disjoint unit lists.
#[derive(Debug, Default)]
pub struct AnalyzedPaths {
    /// Units uploaded directly, chunk by chunk.
    pub stream: Vec<UploadFile>,
    /// Small files handed to the zip batchers.
    pub zip: Vec<UploadFile>,
    /// Estimated number of archives the batchers will produce.
    pub zip_archive_estimate: usize,
}

impl AnalyzedPaths {
    /// Progress denominator: stream bytes plus zipped bytes with the
    /// archive-entry overhead.
    pub fn total_size(&self) -> i64 {
        let zipped: i64 = self
            .zip
            .iter()
            .map(|f| f.size() + f.target_path.len() as i64 + ZIP_ENTRY_OVERHEAD)
            .sum();
        let streamed: i64 = self.stream.iter().map(|f| f.size()).sum();
        zipped + streamed
    }

    /// Counters for the `upload_initialized` event.
    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            files_to_zip: self.zip.len(),
            zip_files: self.zip_archive_estimate,
            files_to_upload: self.stream.len(),
            total_size: self.total_size(),
        }
    }
}

/// Partitions the user's inputs with the standard chunk-size threshold.
pub fn analyze_paths(inputs: Vec<UploadFile>) -> Result<AnalyzedPaths, ImportError> {
    analyze_paths_with_threshold(inputs, UPLOAD_CHUNK_SIZE as i64)
}

/// Partitions the user's inputs.
///
/// Directories are walked recursively; each regular file becomes a unit
/// whose target is its path relative to the walked root. A file smaller
/// than `small_file_threshold` with no attachments goes to the zip list,
/// everything else streams. Attachment groups always stream because their
/// chunks share one flow identifier.
///
/// Fails with [`ImportError::PathMissing`] if any explicitly named entry
/// does not exist; errors on individual walked files only skip those files.
pub fn analyze_paths_with_threshold(
    inputs: Vec<UploadFile>,
    small_file_threshold: i64,
) -> Result<AnalyzedPaths, ImportError> {
    // Validate every named entry before touching any file contents.
    for input in &inputs {
        if !input.source_path.exists() {
            return Err(ImportError::PathMissing(
                input.source_path.display().to_string(),
            ));
        }
        for attachment in &input.attachments {
            if !attachment.exists() {
                return Err(ImportError::PathMissing(attachment.display().to_string()));
            }
        }
    }

    let mut analyzed = AnalyzedPaths::default();
    let mut zipped_bytes = 0i64;

    for input in inputs {
        if input.is_dir() {
            walk_dir(
                &input.source_path,
                &input.source_path,
                small_file_threshold,
                &mut analyzed,
                &mut zipped_bytes,
            );
        } else if input.size() < small_file_threshold && input.attachments.is_empty() {
            zipped_bytes += input.size();
            analyzed.zip.push(input);
        } else {
            analyzed.stream.push(input);
        }
    }

    analyzed.zip_archive_estimate = (zipped_bytes / MAX_ZIP_SIZE + 1) as usize;

    // Zipping only pays off for larger batches; below the threshold the
    // candidates stream as-is.
    if analyzed.zip.len() < ZIPPED_UPLOAD_THRESHOLD {
        analyzed.stream.append(&mut analyzed.zip);
        analyzed.zip_archive_estimate = 0;
    }

    debug!(
        stream = analyzed.stream.len(),
        zip = analyzed.zip.len(),
        zipped_bytes,
        "path analysis complete"
    );
    Ok(analyzed)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    small_file_threshold: i64,
    analyzed: &mut AnalyzedPaths,
    zipped_bytes: &mut i64,
) {
    let entries = match std::fs::read_dir(current) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %current.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        // std::fs::metadata follows symlinks; broken links are skipped.
        let Ok(meta) = std::fs::metadata(&path) else {
            debug!(path = %path.display(), "skipping unreadable entry");
            continue;
        };

        if meta.is_dir() {
            walk_dir(root, &path, small_file_threshold, analyzed, zipped_bytes);
        } else if meta.is_file() {
            let relative = path
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| path.to_string_lossy().replace('\\', "/"));
            let relative = relative.trim_start_matches('/').to_string();

            let Ok(unit) = UploadFile::with_target(&path, relative) else {
                continue;
            };
            if unit.size() < small_file_threshold {
                *zipped_bytes += unit.size();
                analyzed.zip.push(unit);
            } else {
                analyzed.stream.push(unit);
            }
        }
    }
}
