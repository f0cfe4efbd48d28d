use super::schema::Database;
use super::types::{DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed. Following the same feed twice is rejected as a duplicate.
    pub async fn follow_feed(&self, user_id: i64, feed_id: i64) -> Result<FeedFollow, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e, "follow"))?;

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id,
                   u.name AS user_name, f.name AS feed_name, f.url AS feed_url,
                   ff.created_at
            FROM feed_follows ff
            INNER JOIN users u ON u.id = ff.user_id
            INNER JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.id = ?
        "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user = %follow.user_name, feed = %follow.feed_url, "Feed followed");
        Ok(follow)
    }

    /// Remove a follow. Returns `false` when the user was not following the feed.
    pub async fn unfollow_feed(&self, user_id: i64, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Follows of `user_id`, oldest first
    pub async fn follows_for_user(&self, user_id: i64) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id,
                   u.name AS user_name, f.name AS feed_name, f.url AS feed_url,
                   ff.created_at
            FROM feed_follows ff
            INNER JOIN users u ON u.id = ff.user_id
            INNER JOIN feeds f ON f.id = ff.feed_id
            WHERE ff.user_id = ?
            ORDER BY ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};

    #[tokio::test]
    async fn test_follow_and_list() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/feed.xml", alice.id)
            .await
            .unwrap();

        let follow = db.follow_feed(alice.id, feed.id).await.unwrap();
        assert_eq!(follow.user_name, "alice");
        assert_eq!(follow.feed_name, "Blog");

        let follows = db.follows_for_user(alice.id).await.unwrap();
        assert_eq!(follows, vec![follow]);
    }

    #[tokio::test]
    async fn test_follow_twice_is_duplicate() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/feed.xml", alice.id)
            .await
            .unwrap();
        db.follow_feed(alice.id, feed.id).await.unwrap();

        let err = db.follow_feed(alice.id, feed.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unfollow() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/feed.xml", alice.id)
            .await
            .unwrap();
        db.follow_feed(alice.id, feed.id).await.unwrap();

        assert!(db.unfollow_feed(alice.id, feed.id).await.unwrap());
        assert!(!db.unfollow_feed(alice.id, feed.id).await.unwrap());
        assert!(db.follows_for_user(alice.id).await.unwrap().is_empty());
    }
}
