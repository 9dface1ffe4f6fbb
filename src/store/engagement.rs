//! Ratings, likes and comments.

use super::models::CommentView;
use super::Store;
use crate::error::{is_unique_violation, AppResult};
use sqlx::Row;

impl Store {
    /// Raw average and count over all ratings of a file. The average is 0.0
    /// when no ratings exist; callers do their own rounding.
    pub async fn rating_summary(&self, file_id: i64) -> AppResult<(f64, i64)> {
        let row = sqlx::query(
            "SELECT COALESCE(AVG(value), 0.0) AS average, COUNT(value) AS n \
             FROM ratings WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_one(self.pool())
        .await?;
        Ok((row.get::<f64, _>("average"), row.get::<i64, _>("n")))
    }

    pub async fn user_rating(&self, file_id: i64, user_id: i64) -> AppResult<Option<i64>> {
        let value = sqlx::query_scalar::<_, i64>(
            "SELECT value FROM ratings WHERE file_id = ? AND user_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(value)
    }

    /// One rating per (file, user): a second submission replaces the value and
    /// keeps the original row's provenance columns.
    pub async fn upsert_rating(
        &self,
        file_id: i64,
        user_id: i64,
        value: i64,
        ip: &str,
        now: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO ratings (file_id, user_id, value, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (file_id, user_id) DO UPDATE SET value = excluded.value",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(value)
        .bind(ip)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn has_liked(&self, file_id: i64, user_id: i64) -> AppResult<bool> {
        let liked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM likes WHERE file_id = ? AND user_id = ?)",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(liked)
    }

    pub async fn like_count(&self, file_id: i64) -> AppResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE file_id = ?")
            .bind(file_id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    /// Flips the like state and returns the new state (`true` = liked). When a
    /// concurrent request inserts first, the UNIQUE constraint fires and the
    /// file simply stays liked.
    pub async fn toggle_like(
        &self,
        file_id: i64,
        user_id: i64,
        ip: &str,
        now: i64,
    ) -> AppResult<bool> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM likes WHERE file_id = ? AND user_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        match existing {
            Some(id) => {
                sqlx::query("DELETE FROM likes WHERE id = ?")
                    .bind(id)
                    .execute(self.pool())
                    .await?;
                Ok(false)
            }
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO likes (file_id, user_id, liked, ip_address, created_at) \
                     VALUES (?, ?, 1, ?, ?)",
                )
                .bind(file_id)
                .bind(user_id)
                .bind(ip)
                .bind(now)
                .execute(self.pool())
                .await;
                match inserted {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(true),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    pub async fn insert_comment(
        &self,
        file_id: i64,
        user_id: i64,
        content: &str,
        ip: &str,
        now: i64,
    ) -> AppResult<i64> {
        let res = sqlx::query(
            "INSERT INTO comments (file_id, user_id, content, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(content)
        .bind(ip)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Comments newest-first, joined with the author's username.
    pub async fn comments_for_file(&self, file_id: i64) -> AppResult<Vec<CommentView>> {
        let rows = sqlx::query_as::<_, CommentView>(
            "SELECT c.id, c.user_id, u.username, c.content, c.created_at \
             FROM comments c JOIN users u ON u.id = c.user_id \
             WHERE c.file_id = ? ORDER BY c.created_at DESC, c.id DESC",
        )
        .bind(file_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
