//! Chunk upload: one unit, one flow identifier, strictly sequential chunks.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use agora_client::Client;
use agora_transfer::{
    ChunkPlan, FAKE_PROGRESS_THRESHOLD, RateEstimator, TransferProgress, UPLOAD_CHUNK_SIZE,
    UnitChunk, UnitProgress, UnitReader, UploadFile,
};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ImportError;

/// Posts the chunks of upload units to an import package's upload endpoint.
///
/// Holds its own handle on the transport so chunk POSTs run without the
/// client's default request timeout; a 100 MiB chunk on a slow link can
/// legitimately take minutes.
pub struct ChunkUploader {
    http: reqwest::Client,
    upload_url: String,
    api_key: String,
    chunk_size: usize,
}

impl ChunkUploader {
    /// Creates an uploader for one import package.
    pub fn new(client: &Client, package_id: i64, api_key: String) -> Self {
        Self {
            http: client.http().clone(),
            upload_url: client.url(&format!("/api/v1/import/{package_id}/upload/")),
            api_key,
            chunk_size: UPLOAD_CHUNK_SIZE,
        }
    }

    /// Overrides the chunk size (tests use small chunks).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Uploads one unit as a sequence of multipart chunks sharing a fresh
    /// flow identifier.
    ///
    /// A failure marks the unit terminally failed, routes the error through
    /// `progress_tx`, and returns it; callers in the worker pool log and move
    /// on. Delete-after sources are removed on every exit path.
    pub async fn upload_unit(
        &self,
        file: UploadFile,
        progress_tx: Option<&mpsc::Sender<TransferProgress>>,
        rate: &mut RateEstimator,
    ) -> Result<(), ImportError> {
        let _cleanup = DeleteGuard::new(&file);
        let mut progress = UnitProgress::new(file.clone(), progress_tx.cloned());

        let open_file = file.clone();
        let chunk_size = self.chunk_size;
        let mut reader =
            match tokio::task::spawn_blocking(move || UnitReader::open(&open_file, chunk_size))
                .await?
            {
                Ok(reader) => reader,
                Err(e) => {
                    progress.fail(e.to_string()).await;
                    return Err(e.into());
                }
            };

        let plan = reader.plan();
        progress.set_total(plan.total_size);

        let identifier = Uuid::new_v4().to_string();
        let filename = file
            .source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.target_path.clone());

        debug!(
            target = %file.target_path,
            chunks = plan.total_chunks,
            bytes = plan.total_size,
            "uploading unit"
        );

        loop {
            let step = tokio::task::spawn_blocking(move || {
                let chunk = reader.next_chunk();
                (reader, chunk)
            })
            .await?;
            reader = step.0;

            let chunk = match step.1 {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    progress.fail(e.to_string()).await;
                    return Err(e.into());
                }
            };

            self.send_chunk(
                chunk,
                &plan,
                &identifier,
                &file.target_path,
                &filename,
                &mut progress,
                rate,
            )
            .await?;
        }

        progress.complete(rate.bytes_per_sec()).await;
        Ok(())
    }

    /// Posts one chunk, emitting synthetic progress while the request is in
    /// flight.
    #[allow(clippy::too_many_arguments)]
    async fn send_chunk(
        &self,
        chunk: UnitChunk,
        plan: &ChunkPlan,
        identifier: &str,
        target_path: &str,
        filename: &str,
        progress: &mut UnitProgress,
        rate: &mut RateEstimator,
    ) -> Result<(), ImportError> {
        let number = chunk.number;
        let size = chunk.data.len() as i64;
        let form = self.chunk_form(chunk, plan, identifier, target_path, filename)?;

        let request = self
            .http
            .post(&self.upload_url)
            .header(AUTHORIZATION, format!("X-Agora-Api-Key {}", self.api_key))
            .multipart(form)
            .send();
        tokio::pin!(request);

        let started = Instant::now();
        let mut synthetic = 0i64;
        let fake_progress = size > FAKE_PROGRESS_THRESHOLD as i64;

        // The transport exposes no incremental send-byte counts, so a
        // once-per-second ticker emits rate-estimate increments while the
        // POST is outstanding, bounded below the chunk size. Leaving the
        // select loop stops the ticker before anything else happens.
        let response = if fake_progress {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await;
            loop {
                tokio::select! {
                    response = &mut request => break response,
                    _ = ticker.tick() => {
                        let estimate = rate.bytes_per_sec();
                        if synthetic + estimate < size {
                            synthetic += estimate;
                            progress.add_bytes(estimate).await;
                        }
                    }
                }
            }
        } else {
            request.await
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                progress.fail(format!("chunk {number}: {e}")).await;
                return Err(ImportError::Transport(e));
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            let status = response.status().as_u16();
            warn!(chunk = number, status, "chunk rejected");
            progress
                .fail(format!("chunk {number} rejected with http status {status}"))
                .await;
            return Err(ImportError::ChunkRejected(status));
        }

        if fake_progress {
            rate.record(size, started.elapsed());
        }
        // Exact make-up increment for whatever the ticker did not cover.
        progress.add_bytes(size - synthetic).await;
        debug!(chunk = number, bytes = size, "chunk accepted");
        Ok(())
    }

    fn chunk_form(
        &self,
        chunk: UnitChunk,
        plan: &ChunkPlan,
        identifier: &str,
        target_path: &str,
        filename: &str,
    ) -> Result<multipart::Form, ImportError> {
        let UnitChunk { number, data, hash } = chunk;
        let current_size = data.len();
        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        Ok(multipart::Form::new()
            .text("description", "")
            .text("flowChunkNumber", number.to_string())
            .text("flowChunkSize", self.chunk_size.to_string())
            .text("flowCurrentChunkSize", current_size.to_string())
            .text("flowTotalSize", plan.total_size.to_string())
            .text("flowIdentifier", identifier.to_string())
            .text("flowFilename", target_path.to_string())
            .text("flowRelativePath", target_path.to_string())
            .text("flowTotalChunks", plan.total_chunks.to_string())
            .text("flowChunkHash", hash)
            .part("file", part))
    }
}

/// Removes a delete-after source when the unit is done, success or failure.
struct DeleteGuard(Option<PathBuf>);

impl DeleteGuard {
    fn new(file: &UploadFile) -> Self {
        Self(file.delete_after.then(|| file.source_path.clone()))
    }
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
