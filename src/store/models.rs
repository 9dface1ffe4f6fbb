//! Row types returned by the store. Field names mirror the schema so the
//! `FromRow` derives stay plain.

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DirectoryRow {
    pub id: i64,
    /// Relative to the media root; "." is the root itself.
    pub path: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRow {
    pub id: i64,
    pub directory_id: i64,
    pub path: String,
    pub name: String,
    /// Lowercased extension, fixed at discovery time.
    pub kind: String,
    pub size: i64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

impl FileRow {
    /// Display label: the curated title when present, otherwise the filename.
    pub fn label(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => &self.name,
        }
    }
}

/// Never serialized; `password_hash` must not leave the process.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub active: bool,
    pub confirmed_at: Option<i64>,
    pub external_id: String,
    pub created_at: i64,
}

/// Comment joined with its author's username for display.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: i64,
}
