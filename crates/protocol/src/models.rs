//! REST resource models: projects, folders, and folder items.

use serde::{Deserialize, Serialize};

/// Folder-item content type for nested folders.
pub const CONTENT_TYPE_FOLDER: &str = "folder";
/// Folder-item content type for exams.
pub const CONTENT_TYPE_EXAM: &str = "exam";
/// Folder-item content type for series.
pub const CONTENT_TYPE_SERIES: &str = "series";
/// Folder-item content type for datasets.
pub const CONTENT_TYPE_DATASET: &str = "dataset";

/// A project visible to the authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memberships: Vec<Membership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<i64>,
    #[serde(default)]
    pub is_myagora: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_date: String,
}

/// A user's role within a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub user: i64,
    pub role: i32,
    pub project: i64,
}

/// A folder within a project tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<i64>,
}

/// One entry of a folder listing.
///
/// `content_object` is kept as raw JSON because its shape depends on
/// `content_type`; use [`FolderItem::folder_content`] to extract nested
/// folders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderItem {
    pub id: i64,
    pub folder: i64,
    pub content_type: String,
    #[serde(default)]
    pub object_id: i64,
    #[serde(default)]
    pub content_object: serde_json::Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modified_date: String,
    #[serde(default)]
    pub is_link: bool,
}

impl FolderItem {
    /// Parses the content object as a [`Folder`] when this item holds one.
    pub fn folder_content(&self) -> Option<Folder> {
        if self.content_type != CONTENT_TYPE_FOLDER {
            return None;
        }
        serde_json::from_value(self.content_object.clone()).ok()
    }
}
