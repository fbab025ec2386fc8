//! Records exchanged with the import endpoints.

use serde::{Deserialize, Serialize};

/// Server-owned state of an import package.
///
/// Created by `POST /api/v1/import/` and refreshed by polling
/// `GET /api/v1/import/<id>/`. All fields except `id` may be absent in older
/// server versions, so everything defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportPackageRecord {
    pub id: i64,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub extract_zip_files: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub import_file: String,
    #[serde(default)]
    pub import_parameters: bool,
    #[serde(default)]
    pub nof_retries: i32,
    #[serde(default)]
    pub target_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline_items: Vec<i64>,
    #[serde(default)]
    pub user: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modified_date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub complete_date: String,
}

/// Task counters reported alongside the import progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTasks {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub finished: i64,
    #[serde(default)]
    pub error: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<i64>,
}

/// One poll result from `GET /api/v1/import/<id>/progress`.
///
/// Fields default to zero values so older servers with sparser bodies still
/// parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportProgressRecord {
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub progress: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<ImportTasks>,
}

impl ImportProgressRecord {
    /// Returns `true` once the server reports a terminal state at 100 %.
    pub fn is_finished(&self) -> bool {
        crate::is_terminal_state(self.state) && self.progress == 100
    }
}

/// One server-side datafile reported by the result endpoint.
///
/// `created` distinguishes freshly ingested files from files that already
/// existed on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datafile {
    #[serde(default)]
    pub id: i64,
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha1: String,
    #[serde(default)]
    pub dataset: i64,
    #[serde(default)]
    pub created: bool,
}

/// Body of `GET /api/v1/import/<id>/result`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResultRecord {
    pub datafiles: Vec<Datafile>,
}

/// Body of `GET /api/v1/apikey/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub key: String,
}
