//! Import lifecycle: complete, wait for the server-side import, reconcile
//! the result.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use agora_client::ClientError;
use agora_protocol::{
    Datafile, IMPORT_URL, ImportProgressRecord, ImportResultRecord, STATE_ERROR,
};
use agora_transfer::{RateEstimator, UploadFile, sha1_file};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::UploadEvent;
use crate::package::ImportPackage;
use crate::uploader::ChunkUploader;
use crate::ImportError;

/// Poll interval while waiting for the server-side import.
pub const IMPORT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Client-facing outcome of one import, derived by cross-referencing the
/// submitted units against the server's datafile report.
///
/// Every submitted source file lands in exactly one of `imported`,
/// `existed`, `ignored`, `hash_failed`, or `upload_failed`.
#[derive(Debug, Clone, Default)]
pub struct ImportReconciliation {
    /// Source paths of all submitted units.
    pub files: Vec<String>,
    /// Units that failed during upload.
    pub upload_failed: Vec<String>,
    /// Freshly ingested with a matching (or unreadable) local SHA-1.
    pub imported: Vec<String>,
    /// Already present on the server.
    pub existed: Vec<String>,
    /// Not mentioned in the server's report.
    pub ignored: Vec<String>,
    /// Ingested but the local SHA-1 disagrees.
    pub hash_failed: Vec<String>,
}

impl ImportReconciliation {
    pub fn nr_files(&self) -> usize {
        self.files.len()
    }

    pub fn nr_upload_failed(&self) -> usize {
        self.upload_failed.len()
    }

    /// Always `nr_files - nr_upload_failed`, even for a skeleton result.
    pub fn nr_uploaded(&self) -> usize {
        self.files.len() - self.upload_failed.len()
    }

    pub fn nr_imported(&self) -> usize {
        self.imported.len()
    }

    pub fn nr_existed(&self) -> usize {
        self.existed.len()
    }

    pub fn nr_ignored(&self) -> usize {
        self.ignored.len()
    }

    pub fn nr_hash_failed(&self) -> usize {
        self.hash_failed.len()
    }
}

impl ImportPackage {
    /// Seals the package: optionally uploads a JSON import manifest, then
    /// posts the complete request.
    ///
    /// The server answers `204 No Content`; anything else is fatal.
    pub async fn complete(
        &self,
        target_folder_id: Option<i64>,
        json_import_file: Option<&Path>,
        extract_zip_files: bool,
    ) -> Result<(), ImportError> {
        if let Some(manifest) = json_import_file {
            if !manifest.exists() {
                return Err(ImportError::PathMissing(manifest.display().to_string()));
            }
            // The manifest ships through the regular chunk endpoint, outside
            // the worker pool and without progress reporting.
            let api_key = self.client.api_key().await?;
            let uploader = ChunkUploader::new(&self.client, self.id(), api_key);
            let unit = UploadFile::new(manifest, vec![])?;
            uploader
                .upload_unit(unit, None, &mut RateEstimator::new())
                .await?;
        }

        let mut body = serde_json::Map::new();
        if let Some(manifest) = json_import_file {
            let basename = manifest
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            body.insert("import_file".into(), basename.into());
        }
        if let Some(folder) = target_folder_id
            && folder > 0
        {
            body.insert("folder".into(), folder.to_string().into());
        }
        if extract_zip_files {
            body.insert("extract_zip_files".into(), "true".into());
        }

        let path = format!("{IMPORT_URL}{}/complete/", self.id());
        let response = self.client.post(&path, &body, None).await?;
        if response.status().as_u16() != 204 {
            return Err(ImportError::CompleteRejected(response.status().as_u16()));
        }
        debug!(package = self.id(), "import package completed");
        Ok(())
    }

    /// Polls the progress endpoint every two seconds until the server
    /// reports a terminal state at 100 %, or `timeout` elapses.
    ///
    /// Request timeouts during polling are swallowed and the poll retried;
    /// every other transport error is fatal.
    pub async fn wait_for_import(
        &mut self,
        timeout: Duration,
        events: &mpsc::Sender<UploadEvent>,
    ) -> Result<(), ImportError> {
        if self.state() == STATE_ERROR {
            return Ok(());
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(IMPORT_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = &mut deadline => return Err(ImportError::ProgressTimeout),
                _ = ticker.tick() => {
                    let progress = match self.fetch_progress().await {
                        Ok(progress) => progress,
                        Err(ClientError::Http(e)) if e.is_timeout() => {
                            warn!(package = self.id(), "progress poll timed out, retrying");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    let _ = events
                        .send(UploadEvent::ImportProgress(progress.clone()))
                        .await;

                    if progress.is_finished() {
                        self.record.state = progress.state;
                        self.import_finished = true;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn fetch_progress(&self) -> Result<ImportProgressRecord, ClientError> {
        let path = format!("{IMPORT_URL}{}/progress", self.id());
        self.client.get_json(&path).await
    }

    /// Fetches the server's datafile report and buckets every submitted
    /// file.
    ///
    /// Before the import finished this returns a skeleton carrying only the
    /// client-side counts.
    pub async fn result(
        &self,
        events: &mpsc::Sender<UploadEvent>,
    ) -> Result<ImportReconciliation, ImportError> {
        let mut reconciliation = ImportReconciliation {
            files: self
                .files
                .iter()
                .map(|f| f.source_path.display().to_string())
                .collect(),
            upload_failed: self
                .upload_failed
                .iter()
                .map(|f| f.source_path.display().to_string())
                .collect(),
            ..Default::default()
        };

        if !self.import_finished {
            return Ok(reconciliation);
        }

        let path = format!("{IMPORT_URL}{}/result", self.id());
        let record: ImportResultRecord = match self.client.get_json(&path).await {
            Ok(record) => record,
            Err(ClientError::Http(e)) if e.is_decode() => {
                return Err(ImportError::ResultUnparseable);
            }
            Err(e) => return Err(e.into()),
        };

        let mut lookup: HashMap<String, Datafile> = record
            .datafiles
            .into_iter()
            .map(|datafile| (clean_path(&datafile.path), datafile))
            .collect();

        let total = self.files.len();
        let step = (total / 100).max(1);
        for (index, file) in self.files.iter().enumerate() {
            let source = file.source_path.display().to_string();
            let key = clean_path(&file.target_path);
            match lookup.get(&key).map(|d| (d.created, d.sha1.clone())) {
                None => reconciliation.ignored.push(source),
                Some((true, expected)) => {
                    let local = file.source_path.clone();
                    let hash =
                        tokio::task::spawn_blocking(move || sha1_file(&local)).await?;
                    match hash {
                        Ok(hash) if hash != expected => {
                            reconciliation.hash_failed.push(source)
                        }
                        // An unreadable local file cannot disprove the
                        // import.
                        _ => reconciliation.imported.push(source),
                    }
                    // Duplicate target paths must not match twice.
                    lookup.remove(&key);
                }
                Some((false, _)) => reconciliation.existed.push(source),
            }

            if (index + 1) % step == 0 || index + 1 == total {
                let _ = events
                    .send(UploadEvent::ResultProgress {
                        processed: index + 1,
                        total,
                    })
                    .await;
            }
        }

        Ok(reconciliation)
    }
}

/// Normalizes a wire path for lookup: forward slashes, no empty or `.`
/// segments, `..` resolved lexically.
fn clean_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
