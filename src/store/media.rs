//! Directory and file rows for the mirrored tree.
//!
//! Creation is lazy and races are expected: two requests may both miss the
//! SELECT and both INSERT. The UNIQUE(path) constraint lets exactly one win;
//! the loser rereads and returns the winner's row.

use super::models::{DirectoryRow, FileRow};
use super::Store;
use crate::error::{is_unique_violation, AppError, AppResult};
use serde::Deserialize;
use tracing::debug;

/// Full-replace metadata update for a file. Absent fields clear the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileMetaPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

/// Full-replace metadata update for a directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryMetaPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

impl Store {
    pub async fn directory_by_path(&self, path: &str) -> AppResult<Option<DirectoryRow>> {
        let row = sqlx::query_as::<_, DirectoryRow>(
            "SELECT id, path, title, description, image_path FROM directories WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn directory_by_id(&self, id: i64) -> AppResult<Option<DirectoryRow>> {
        let row = sqlx::query_as::<_, DirectoryRow>(
            "SELECT id, path, title, description, image_path FROM directories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Returns the row for `path`, inserting it first if missing. Safe to call
    /// concurrently for the same path.
    pub async fn get_or_create_directory(&self, path: &str) -> AppResult<DirectoryRow> {
        if let Some(row) = self.directory_by_path(path).await? {
            return Ok(row);
        }
        let inserted = sqlx::query("INSERT INTO directories (path) VALUES (?)")
            .bind(path)
            .execute(self.pool())
            .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(path, "directory insert lost a race, rereading");
            }
            Err(e) => return Err(e.into()),
        }
        self.directory_by_path(path).await?.ok_or_else(|| {
            AppError::internal("mirror", format!("directory row vanished after insert: {path}"))
        })
    }

    pub async fn file_by_path(&self, path: &str) -> AppResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, directory_id, path, name, kind, size, title, artist, album, genre, \
             tags, description, image_path FROM files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn file_by_id(&self, id: i64) -> AppResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, directory_id, path, name, kind, size, title, artist, album, genre, \
             tags, description, image_path FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Lazy insert for a discovered file. An existing row wins outright: size
    /// and kind are a snapshot from first discovery and are never rewritten.
    pub async fn get_or_create_file(
        &self,
        directory_id: i64,
        path: &str,
        name: &str,
        kind: &str,
        size: i64,
    ) -> AppResult<FileRow> {
        if let Some(row) = self.file_by_path(path).await? {
            return Ok(row);
        }
        let inserted = sqlx::query(
            "INSERT INTO files (directory_id, path, name, kind, size) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(directory_id)
        .bind(path)
        .bind(name)
        .bind(kind)
        .bind(size)
        .execute(self.pool())
        .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                debug!(path, "file insert lost a race, rereading");
            }
            Err(e) => return Err(e.into()),
        }
        self.file_by_path(path).await?.ok_or_else(|| {
            AppError::internal("mirror", format!("file row vanished after insert: {path}"))
        })
    }

    pub async fn update_file_meta(&self, id: i64, patch: &FileMetaPatch) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE files SET title = ?, artist = ?, album = ?, genre = ?, tags = ?, \
             description = ?, image_path = ? WHERE id = ?",
        )
        .bind(patch.title.as_deref())
        .bind(patch.artist.as_deref())
        .bind(patch.album.as_deref())
        .bind(patch.genre.as_deref())
        .bind(patch.tags.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.image_path.as_deref())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn update_directory_meta(
        &self,
        id: i64,
        patch: &DirectoryMetaPatch,
    ) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE directories SET title = ?, description = ?, image_path = ? WHERE id = ?",
        )
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.image_path.as_deref())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
