//! Engagement aggregator
//! ---------------------
//! Ratings, likes and comments on mirrored files, plus the derived views the
//! UI wants: a two-decimal average, a count, and a unicode star strip.

use crate::error::{AppError, AppResult};
use crate::store::models::{CommentView, FileRow};
use crate::store::Store;
use serde::Serialize;

/// Ratings run 1..=MAX_RATING inclusive.
pub const MAX_RATING: i64 = 5;

const FULL_STAR: char = '★';
const HALF_STAR: char = '⭐';
const EMPTY_STAR: char = '☆';

/// Renders an average as a fixed-width strip of `max_rating` glyphs. Position
/// `i` (1-indexed) is full when the average reaches `i`, half when it reaches
/// `i - 0.5`, empty otherwise.
pub fn star_glyphs(average: f64, max_rating: i64) -> String {
    let mut stars = String::new();
    for i in 1..=max_rating {
        let position = i as f64;
        if average >= position {
            stars.push(FULL_STAR);
        } else if average >= position - 0.5 {
            stars.push(HALF_STAR);
        } else {
            stars.push(EMPTY_STAR);
        }
    }
    stars
}

/// Rating aggregate for one file. `average` is 0.00 with `count` 0 when
/// nobody has rated, never null.
#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
    pub stars: String,
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

impl LikeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeOutcome::Liked => "liked",
            LikeOutcome::Unliked => "unliked",
        }
    }
}

/// A file row decorated with its engagement aggregates, as shown in listings.
#[derive(Debug, Serialize)]
pub struct DecoratedFile {
    pub file: FileRow,
    pub rating: RatingSummary,
    pub liked: bool,
}

#[derive(Clone)]
pub struct Engagement {
    store: Store,
}

impl Engagement {
    pub fn new(store: Store) -> Self {
        Engagement { store }
    }

    /// Average rounded to two decimals, plus count and the star strip.
    pub async fn rating_summary(&self, file_id: i64) -> AppResult<RatingSummary> {
        let (raw, count) = self.store.rating_summary(file_id).await?;
        let average = (raw * 100.0).round() / 100.0;
        Ok(RatingSummary {
            average,
            count,
            stars: star_glyphs(average, MAX_RATING),
        })
    }

    /// False for anonymous viewers, without error.
    pub async fn has_liked(&self, file_id: i64, viewer: Option<i64>) -> AppResult<bool> {
        match viewer {
            Some(user_id) => self.store.has_liked(file_id, user_id).await,
            None => Ok(false),
        }
    }

    pub async fn like_count(&self, file_id: i64) -> AppResult<i64> {
        self.store.like_count(file_id).await
    }

    pub async fn toggle_like(
        &self,
        file_id: i64,
        user_id: i64,
        ip: &str,
    ) -> AppResult<LikeOutcome> {
        let liked = self
            .store
            .toggle_like(file_id, user_id, ip, crate::now_epoch())
            .await?;
        Ok(if liked {
            LikeOutcome::Liked
        } else {
            LikeOutcome::Unliked
        })
    }

    /// Records or replaces the caller's rating for a file.
    pub async fn upsert_rating(
        &self,
        file_id: i64,
        user_id: i64,
        value: i64,
        ip: &str,
    ) -> AppResult<()> {
        if !(1..=MAX_RATING).contains(&value) {
            return Err(AppError::validation(
                "invalid_rating",
                format!("rating must be between 1 and {MAX_RATING}"),
            ));
        }
        self.store
            .upsert_rating(file_id, user_id, value, ip, crate::now_epoch())
            .await
    }

    pub async fn user_rating(&self, file_id: i64, user_id: i64) -> AppResult<Option<i64>> {
        self.store.user_rating(file_id, user_id).await
    }

    pub async fn add_comment(
        &self,
        file_id: i64,
        author_id: i64,
        author_name: &str,
        content: &str,
        ip: &str,
    ) -> AppResult<CommentView> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("empty_comment", "comment must not be empty"));
        }
        let now = crate::now_epoch();
        let id = self
            .store
            .insert_comment(file_id, author_id, content, ip, now)
            .await?;
        Ok(CommentView {
            id,
            user_id: author_id,
            username: author_name.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    pub async fn comments_for_file(&self, file_id: i64) -> AppResult<Vec<CommentView>> {
        self.store.comments_for_file(file_id).await
    }

    pub async fn delete_comment(&self, comment_id: i64) -> AppResult<()> {
        if !self.store.delete_comment(comment_id).await? {
            return Err(AppError::not_found(
                "comment_missing",
                format!("no comment with id {comment_id}"),
            ));
        }
        Ok(())
    }

    /// Listing decoration: each file with its rating aggregate and whether the
    /// viewer has liked it. One query pair per file, same shape as the page
    /// needs it.
    pub async fn decorate_files(
        &self,
        files: Vec<FileRow>,
        viewer: Option<i64>,
    ) -> AppResult<Vec<DecoratedFile>> {
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            let rating = self.rating_summary(file.id).await?;
            let liked = self.has_liked(file.id, viewer).await?;
            out.push(DecoratedFile { file, rating, liked });
        }
        Ok(out)
    }
}
