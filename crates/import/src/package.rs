//! Import-package handle.

use agora_client::Client;
use agora_protocol::{IMPORT_URL, ImportPackageRecord};
use agora_transfer::UploadFile;
use tracing::debug;

use crate::ImportError;

/// Client-side handle on one server-side import package.
///
/// Created by [`ImportPackage::create`]. The upload coordinator fills
/// `files` and `upload_failed` while transferring; the lifecycle calls
/// refresh the server record and drive completion.
pub struct ImportPackage {
    pub(crate) client: Client,
    pub(crate) record: ImportPackageRecord,
    /// All units actually submitted (streamed units plus zipped originals).
    pub files: Vec<UploadFile>,
    /// Units whose terminal error is set.
    pub upload_failed: Vec<UploadFile>,
    pub(crate) import_finished: bool,
}

impl ImportPackage {
    /// Creates a fresh import package on the server.
    pub async fn create(client: &Client) -> Result<Self, ImportError> {
        let record: ImportPackageRecord =
            client.post_json(IMPORT_URL, &serde_json::json!({})).await?;
        debug!(package = record.id, "import package created");
        Ok(Self::from_record(client.clone(), record))
    }

    /// Wraps an already-known server record, e.g. to resume driving a
    /// package created in an earlier call.
    pub fn from_record(client: Client, record: ImportPackageRecord) -> Self {
        Self {
            client,
            record,
            files: Vec::new(),
            upload_failed: Vec::new(),
            import_finished: false,
        }
    }

    /// The server-assigned package id.
    pub fn id(&self) -> i64 {
        self.record.id
    }

    /// The last seen server record.
    pub fn record(&self) -> &ImportPackageRecord {
        &self.record
    }

    /// Latest known server-side state code.
    pub fn state(&self) -> i32 {
        self.record.state
    }

    /// Returns `true` once a poll observed the terminal state at 100 %.
    pub fn import_finished(&self) -> bool {
        self.import_finished
    }

    /// Re-fetches the server-owned record fields.
    pub async fn refresh(&mut self) -> Result<(), ImportError> {
        let path = format!("{IMPORT_URL}{}/", self.record.id);
        self.record = self.client.get_json(&path).await?;
        Ok(())
    }
}
