//! Wire-level types and constants for the Agora REST API.
//!
//! Pure serde data structures shared by the HTTP client and the bulk-import
//! engine. No I/O happens in this crate.

pub mod models;
pub mod records;

pub use models::{Folder, FolderItem, Membership, Project};
pub use records::{
    ApiKeyResponse, Datafile, ImportPackageRecord, ImportProgressRecord, ImportResultRecord,
    ImportTasks,
};

/// Base path of the import-package resource.
pub const IMPORT_URL: &str = "/api/v1/import/";

/// Base path of the project resource.
pub const PROJECT_URL: &str = "/api/v2/project/";

/// Base path of the folder resource.
pub const FOLDER_URL: &str = "/api/v2/folder/";

/// Server-side import states, preserved as the integer codes used on the wire.
pub const STATE_UPLOADING: i32 = 1;
pub const STATE_CHECKING: i32 = 2;
pub const STATE_ANALYZING: i32 = 3;
pub const STATE_IMPORTING: i32 = 4;
pub const STATE_FINISHED: i32 = 5;
pub const STATE_ERROR: i32 = -1;

/// Returns `true` if `state` is one of the two terminal import states.
pub fn is_terminal_state(state: i32) -> bool {
    state == STATE_FINISHED || state == STATE_ERROR
}
