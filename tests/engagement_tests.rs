//! Engagement integration tests: rating aggregates, like toggles and comments
//! against a real SQLite store.

use anyhow::Result;

use alcove::engagement::{Engagement, LikeOutcome};
use alcove::store::Store;

async fn fixture() -> Result<(Store, Engagement)> {
    let store = Store::open_in_memory().await?;
    let engagement = Engagement::new(store.clone());
    Ok((store, engagement))
}

async fn seed_file(store: &Store, path: &str) -> Result<i64> {
    let dir = store.get_or_create_directory(".").await?;
    let file = store.get_or_create_file(dir.id, path, path, "mp3", 3).await?;
    Ok(file.id)
}

async fn seed_user(store: &Store, email: &str, username: &str) -> Result<i64> {
    let user = store
        .create_user(
            email,
            username,
            "unused-test-hash",
            &uuid::Uuid::new_v4().to_string(),
            chrono::Utc::now().timestamp(),
        )
        .await?;
    Ok(user.id)
}

#[tokio::test]
async fn unrated_files_have_a_zero_summary() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let file = seed_file(&store, "quiet.mp3").await?;

    let summary = engagement.rating_summary(file).await?;
    assert_eq!(summary.average, 0.0);
    assert_eq!(summary.count, 0);
    assert_eq!(summary.stars, "☆☆☆☆☆");
    Ok(())
}

#[tokio::test]
async fn averages_round_to_two_decimals() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let bob = seed_user(&store, "b@example.com", "bob").await?;
    let cara = seed_user(&store, "c@example.com", "cara").await?;

    let file = seed_file(&store, "one.mp3").await?;
    engagement.upsert_rating(file, alice, 3, "10.0.0.1").await?;
    engagement.upsert_rating(file, bob, 4, "10.0.0.2").await?;
    engagement.upsert_rating(file, cara, 5, "10.0.0.3").await?;
    let summary = engagement.rating_summary(file).await?;
    assert_eq!(summary.average, 4.0);
    assert_eq!(summary.count, 3);
    assert_eq!(summary.stars, "★★★★☆");

    // 4/3 rounds to 1.33
    let file = seed_file(&store, "two.mp3").await?;
    engagement.upsert_rating(file, alice, 1, "10.0.0.1").await?;
    engagement.upsert_rating(file, bob, 1, "10.0.0.2").await?;
    engagement.upsert_rating(file, cara, 2, "10.0.0.3").await?;
    let summary = engagement.rating_summary(file).await?;
    assert_eq!(summary.average, 1.33);

    // A .5 average earns a half star
    let file = seed_file(&store, "three.mp3").await?;
    engagement.upsert_rating(file, alice, 3, "10.0.0.1").await?;
    engagement.upsert_rating(file, bob, 4, "10.0.0.2").await?;
    let summary = engagement.rating_summary(file).await?;
    assert_eq!(summary.average, 3.5);
    assert_eq!(summary.stars, "★★★⭐☆");
    Ok(())
}

#[tokio::test]
async fn rating_again_replaces_the_prior_value() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let file = seed_file(&store, "track.mp3").await?;

    engagement.upsert_rating(file, alice, 2, "10.0.0.1").await?;
    engagement.upsert_rating(file, alice, 5, "10.0.0.1").await?;

    let summary = engagement.rating_summary(file).await?;
    assert_eq!(summary.count, 1, "one row per user and file");
    assert_eq!(summary.average, 5.0);
    assert_eq!(engagement.user_rating(file, alice).await?, Some(5));
    Ok(())
}

#[tokio::test]
async fn out_of_range_ratings_are_rejected() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let file = seed_file(&store, "track.mp3").await?;

    let err = engagement.upsert_rating(file, alice, 0, "10.0.0.1").await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    let err = engagement.upsert_rating(file, alice, 6, "10.0.0.1").await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(engagement.rating_summary(file).await?.count, 0);
    Ok(())
}

#[tokio::test]
async fn like_toggle_alternates() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let file = seed_file(&store, "track.mp3").await?;

    assert_eq!(engagement.toggle_like(file, alice, "10.0.0.1").await?, LikeOutcome::Liked);
    assert!(engagement.has_liked(file, Some(alice)).await?);
    assert_eq!(engagement.like_count(file).await?, 1);

    assert_eq!(engagement.toggle_like(file, alice, "10.0.0.1").await?, LikeOutcome::Unliked);
    assert!(!engagement.has_liked(file, Some(alice)).await?);
    assert_eq!(engagement.like_count(file).await?, 0);

    assert_eq!(engagement.toggle_like(file, alice, "10.0.0.1").await?, LikeOutcome::Liked);
    Ok(())
}

#[tokio::test]
async fn likes_are_per_user() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let bob = seed_user(&store, "b@example.com", "bob").await?;
    let file = seed_file(&store, "track.mp3").await?;

    engagement.toggle_like(file, alice, "10.0.0.1").await?;
    engagement.toggle_like(file, bob, "10.0.0.2").await?;
    assert_eq!(engagement.like_count(file).await?, 2);

    engagement.toggle_like(file, alice, "10.0.0.1").await?;
    assert_eq!(engagement.like_count(file).await?, 1);
    assert!(engagement.has_liked(file, Some(bob)).await?);
    // Anonymous viewers never read as having liked anything
    assert!(!engagement.has_liked(file, None).await?);
    Ok(())
}

#[tokio::test]
async fn comments_list_newest_first_with_usernames() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let bob = seed_user(&store, "b@example.com", "bob").await?;
    let file = seed_file(&store, "track.mp3").await?;

    engagement.add_comment(file, alice, "alice", "  first!  ", "10.0.0.1").await?;
    engagement.add_comment(file, bob, "bob", "second", "10.0.0.2").await?;

    let comments = engagement.comments_for_file(file).await?;
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].username, "bob", "latest comment leads");
    assert_eq!(comments[0].content, "second");
    assert_eq!(comments[1].username, "alice");
    assert_eq!(comments[1].content, "first!", "content is stored trimmed");
    Ok(())
}

#[tokio::test]
async fn blank_comments_are_rejected() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let file = seed_file(&store, "track.mp3").await?;

    let err = engagement.add_comment(file, alice, "alice", "", "10.0.0.1").await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    let err = engagement.add_comment(file, alice, "alice", "   ", "10.0.0.1").await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert!(engagement.comments_for_file(file).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleted_comments_disappear() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let file = seed_file(&store, "track.mp3").await?;

    let comment = engagement.add_comment(file, alice, "alice", "delete me", "10.0.0.1").await?;
    engagement.delete_comment(comment.id).await?;
    assert!(engagement.comments_for_file(file).await?.is_empty());

    // Deleting twice is a not-found, not a silent no-op
    let err = engagement.delete_comment(comment.id).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
    Ok(())
}

#[tokio::test]
async fn decorate_files_marks_the_viewers_likes() -> Result<()> {
    let (store, engagement) = fixture().await?;
    let alice = seed_user(&store, "a@example.com", "alice").await?;
    let first = seed_file(&store, "first.mp3").await?;
    let second = seed_file(&store, "second.mp3").await?;

    engagement.toggle_like(first, alice, "10.0.0.1").await?;
    engagement.upsert_rating(second, alice, 4, "10.0.0.1").await?;

    let rows = vec![
        store.file_by_id(first).await?.expect("seeded"),
        store.file_by_id(second).await?.expect("seeded"),
    ];
    let decorated = engagement.decorate_files(rows.clone(), Some(alice)).await?;
    assert!(decorated[0].liked);
    assert!(!decorated[1].liked);
    assert_eq!(decorated[1].rating.count, 1);
    assert_eq!(decorated[1].rating.average, 4.0);

    let anonymous = engagement.decorate_files(rows, None).await?;
    assert!(anonymous.iter().all(|d| !d.liked));
    Ok(())
}
