//! Filesystem mirror
//! -----------------
//! Reconciles what is on disk with the relational rows that carry curated
//! metadata and engagement. Reads are the write path: browsing a directory
//! lazily inserts any rows the database is missing, so the mirror never needs
//! a background indexer. Rows are keyed by path relative to the media root
//! ("." is the root itself).

use crate::error::{AppError, AppResult};
use crate::store::models::{DirectoryRow, FileRow};
use crate::store::Store;
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions eligible for mirroring: audio, video and documents.
pub const MEDIA_EXTENSIONS: [&str; 5] = ["mp3", "wav", "mp4", "avi", "pdf"];

/// The stored `kind` for a filename: its lowercased extension, provided that
/// extension is on the whitelist.
pub fn media_kind(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    MEDIA_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

#[derive(Clone)]
pub struct Mirror {
    media_root: PathBuf,
    store: Store,
}

impl Mirror {
    pub fn new(media_root: PathBuf, store: Store) -> Self {
        Mirror { media_root, store }
    }

    /// Resolves `rel` against the media root and rejects anything that
    /// escapes it. Returns the absolute path plus the canonical relative key
    /// used for database rows.
    fn resolve(&self, rel: &str) -> AppResult<(PathBuf, String)> {
        let root = self.media_root.absolutize()?.into_owned();
        let joined = root.join(rel.trim_start_matches('/'));
        let abs = joined.absolutize()?.into_owned();
        if !abs.starts_with(&root) {
            warn!(rel, "browse path escapes media root");
            return Err(not_a_directory(rel));
        }
        let key = match abs.strip_prefix(&root) {
            Ok(p) if p.as_os_str().is_empty() => ".".to_string(),
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(_) => ".".to_string(),
        };
        Ok((abs, key))
    }

    /// Returns the directory row for `rel` and its eligible files, inserting
    /// whatever rows are missing. Existing file rows are returned as-is: size
    /// and kind are snapshots from first discovery, deliberately not refreshed
    /// on later visits.
    ///
    /// Ordering is part of the contract: case-insensitive by curated title
    /// when present, otherwise by filename.
    pub async fn reconcile(&self, rel: &str) -> AppResult<(DirectoryRow, Vec<FileRow>)> {
        let (abs, key) = self.resolve(rel)?;
        if !abs.is_dir() {
            return Err(not_a_directory(rel));
        }
        let directory = self.store.get_or_create_directory(&key).await?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&abs)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!(entry = ?file_name, "skipping non-utf8 name");
                continue;
            };
            // Follows symlinks, so a linked file counts as a file.
            let meta = std::fs::metadata(entry.path())?;
            if !meta.is_file() {
                continue;
            }
            let Some(kind) = media_kind(name) else {
                continue;
            };
            let rel_file = if key == "." {
                name.to_string()
            } else {
                format!("{key}/{name}")
            };
            let row = self
                .store
                .get_or_create_file(directory.id, &rel_file, name, &kind, meta.len() as i64)
                .await?;
            files.push(row);
        }

        files.sort_by_cached_key(|f| f.label().to_lowercase());
        Ok((directory, files))
    }

    /// Eager sweep for the admin command: reconciles every directory under the
    /// media root once and reports (relative path, eligible file count) pairs.
    pub async fn scan_tree(&self) -> AppResult<Vec<(String, usize)>> {
        let root = self.media_root.absolutize()?.into_owned();
        let mut report = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| AppError::internal("scan", e.to_string()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&root) {
                Ok(p) if p.as_os_str().is_empty() => ".".to_string(),
                Ok(p) => p.to_string_lossy().into_owned(),
                Err(_) => continue,
            };
            let (_, files) = self.reconcile(&rel).await?;
            report.push((rel, files.len()));
        }
        Ok(report)
    }
}

fn not_a_directory(rel: &str) -> AppError {
    AppError::not_found("not_a_directory", format!("not a directory: {rel}"))
}
