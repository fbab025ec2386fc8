//! Upload coordination: worker pool, producers, and progress fan-in.
//!
//! One `upload` call owns the whole concurrency graph: a bounded work
//! channel drained by `PARALLEL_UPLOADS` chunk workers, one stream producer,
//! one or more zip producers, and a single aggregator task that turns
//! per-unit progress records into user-facing events. Nothing else writes
//! `upload_failed` or the percentage counter.

use std::path::PathBuf;
use std::sync::Arc;

use agora_transfer::{RateEstimator, TransferProgress, UploadFile};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analyzer::{AnalyzedPaths, analyze_paths};
use crate::batcher::ZipBatcher;
use crate::events::UploadEvent;
use crate::package::ImportPackage;
use crate::uploader::ChunkUploader;
use crate::{ImportError, MAX_ZIP_SIZE, PARALLEL_UPLOADS};

impl ImportPackage {
    /// Transfers `inputs` into this package.
    ///
    /// Directories are expanded, small files are zip-batched, and every unit
    /// ships through the worker pool. Per-unit failures do not fail the
    /// call; they surface as [`UploadEvent::UploadError`] and accumulate in
    /// `upload_failed`. The call itself errors only when the run cannot
    /// proceed at all: a missing named input, no resolvable API key, or an
    /// aborted producer.
    pub async fn upload(
        &mut self,
        inputs: Vec<UploadFile>,
        events: &mpsc::Sender<UploadEvent>,
    ) -> Result<(), ImportError> {
        let _ = events
            .send(UploadEvent::UploadStarted {
                package_id: self.id(),
            })
            .await;

        let analyzed = analyze_paths(inputs)?;
        let _ = events
            .send(UploadEvent::UploadInitialized(analyzed.summary()))
            .await;

        let api_key = self.client.api_key().await?;
        let temp_dir = tempfile::tempdir()?;

        let result = self
            .run_transfer(analyzed, api_key, temp_dir.path().to_path_buf(), events)
            .await;

        // Dropping the scoped temp dir removes any archives a failed
        // producer left behind.
        drop(temp_dir);
        result
    }

    async fn run_transfer(
        &mut self,
        analyzed: AnalyzedPaths,
        api_key: String,
        temp_dir: PathBuf,
        events: &mpsc::Sender<UploadEvent>,
    ) -> Result<(), ImportError> {
        let total_size = analyzed.total_size();
        let stream_list = analyzed.stream;
        let zip_list = analyzed.zip;

        let (work_tx, work_rx) = mpsc::channel::<UploadFile>(PARALLEL_UPLOADS);
        let (progress_tx, progress_rx) = mpsc::channel::<TransferProgress>(PARALLEL_UPLOADS);

        let aggregator = tokio::spawn(aggregate_progress(
            progress_rx,
            events.clone(),
            total_size,
        ));

        let uploader = Arc::new(ChunkUploader::new(&self.client, self.id(), api_key));
        let work_rx = Arc::new(Mutex::new(work_rx));
        let mut workers = Vec::with_capacity(PARALLEL_UPLOADS);
        for _ in 0..PARALLEL_UPLOADS {
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&uploader),
                Arc::clone(&work_rx),
                progress_tx.clone(),
                events.clone(),
            )));
        }

        let mut producers: Vec<JoinHandle<Result<(), ImportError>>> = Vec::new();

        {
            let tx = work_tx.clone();
            let list = stream_list.clone();
            producers.push(tokio::spawn(async move {
                for unit in list {
                    tx.send(unit).await.map_err(|_| ImportError::PoolClosed)?;
                }
                Ok(())
            }));
        }

        if !zip_list.is_empty() {
            let zip_bytes: i64 = zip_list.iter().map(|f| f.size()).sum();
            let producer_count = if zip_bytes > MAX_ZIP_SIZE {
                PARALLEL_UPLOADS
            } else {
                1
            };
            let slice_len = zip_list.len().div_ceil(producer_count).max(1);
            for (producer_id, slice) in zip_list.chunks(slice_len).enumerate() {
                let batcher = ZipBatcher::new(temp_dir.clone(), producer_id);
                let tx = work_tx.clone();
                let slice = slice.to_vec();
                producers.push(tokio::spawn(async move {
                    batcher.run(slice, &tx).await.map(|_| ())
                }));
            }
        }

        // Shutdown order: producers first, then the work channel closes,
        // workers drain and exit, the completion event goes out, and only
        // then does the progress channel close so the aggregator can finish.
        drop(work_tx);

        let mut producer_error: Option<ImportError> = None;
        for producer in producers {
            let result = match producer.await {
                Ok(result) => result,
                Err(e) => Err(ImportError::Join(e)),
            };
            if let Err(e) = result {
                debug!(error = %e, "producer aborted");
                producer_error.get_or_insert(e);
            }
        }

        for worker in workers {
            worker.await?;
        }

        let _ = events
            .send(UploadEvent::UploadCompleted {
                package_id: self.id(),
            })
            .await;

        drop(progress_tx);
        let failed = aggregator.await?;

        self.files = stream_list;
        self.files.extend(zip_list);
        self.upload_failed = failed;

        info!(
            package = self.id(),
            files = self.files.len(),
            failed = self.upload_failed.len(),
            "upload run finished"
        );

        match producer_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// One chunk-upload worker: drains the work channel until it closes.
async fn run_worker(
    uploader: Arc<ChunkUploader>,
    work_rx: Arc<Mutex<mpsc::Receiver<UploadFile>>>,
    progress_tx: mpsc::Sender<TransferProgress>,
    events: mpsc::Sender<UploadEvent>,
) {
    let mut rate = RateEstimator::new();
    loop {
        // Hold the lock only for the dequeue so siblings keep draining.
        let unit = { work_rx.lock().await.recv().await };
        let Some(unit) = unit else { break };

        let _ = events
            .send(UploadEvent::FileUploadStarted { file: unit.clone() })
            .await;
        if let Err(e) = uploader
            .upload_unit(unit, Some(&progress_tx), &mut rate)
            .await
        {
            // The failure is already on the progress stream; keep draining.
            debug!(error = %e, "unit upload failed");
        }
    }
}

/// Single consumer of per-unit progress records; sole writer of the failed
/// list and the aggregated percentage.
async fn aggregate_progress(
    mut progress_rx: mpsc::Receiver<TransferProgress>,
    events: mpsc::Sender<UploadEvent>,
    total_size: i64,
) -> Vec<UploadFile> {
    let mut uploaded = 0i64;
    let mut failed = Vec::new();

    while let Some(record) = progress_rx.recv().await {
        if record.error.is_some() {
            failed.push(record.file.clone());
            let _ = events
                .send(UploadEvent::UploadError {
                    file: record.file.clone(),
                })
                .await;
        } else if record.bytes_transferred == record.total_size {
            let _ = events
                .send(UploadEvent::FileUploadCompleted {
                    file: record.file.clone(),
                })
                .await;
        }

        let increment = record.bytes_increment;
        let _ = events.send(UploadEvent::FileProgress(record)).await;

        uploaded += increment;
        if total_size > 0 {
            let percent = ((100 * uploaded / total_size) as i32).min(99);
            let _ = events.send(UploadEvent::Progress { percent }).await;
        }
    }

    failed
}
