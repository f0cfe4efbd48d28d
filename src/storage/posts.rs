use super::schema::Database;
use super::types::{DatabaseError, InsertOutcome, NewPost, Post};

/// Maximum number of posts returned by a browse query (OOM protection)
const MAX_POSTS: i64 = 1000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one with the same canonical link already exists.
    ///
    /// Collisions are not errors: the existing row is left untouched and
    /// [`InsertOutcome::Skipped`] is returned.
    pub async fn insert_post_if_absent(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e, "post"))?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Skipped)
        }
    }

    /// Newest posts from the feeds `user_id` follows.
    ///
    /// Posts without a published date sort after dated ones. `limit` is
    /// capped at 1000.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, DatabaseError> {
        let limit = limit.clamp(1, MAX_POSTS);
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at
            FROM posts p
            INNER JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// All posts of one feed in insertion order
    pub async fn posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, InsertOutcome, NewPost};

    async fn setup() -> (Database, i64, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/feed.xml", user.id)
            .await
            .unwrap();
        db.follow_feed(user.id, feed.id).await.unwrap();
        (db, user.id, feed)
    }

    fn post(feed_id: i64, slug: &str, published_at: Option<i64>) -> NewPost {
        NewPost {
            feed_id,
            title: format!("Post {}", slug),
            url: format!("https://example.com/{}", slug),
            description: "Body".to_string(),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_by_link() {
        let (db, _, feed) = setup().await;
        let p = post(feed.id, "a", Some(1_700_000_000));

        assert_eq!(db.insert_post_if_absent(&p).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(db.insert_post_if_absent(&p).await.unwrap(), InsertOutcome::Skipped);

        let mut changed = p.clone();
        changed.title = "Retitled".to_string();
        assert_eq!(db.insert_post_if_absent(&changed).await.unwrap(), InsertOutcome::Skipped);

        let posts = db.posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post a");
    }

    #[tokio::test]
    async fn test_posts_for_user_newest_first() {
        let (db, user_id, feed) = setup().await;
        db.insert_post_if_absent(&post(feed.id, "old", Some(100))).await.unwrap();
        db.insert_post_if_absent(&post(feed.id, "undated", None)).await.unwrap();
        db.insert_post_if_absent(&post(feed.id, "new", Some(200))).await.unwrap();

        let titles: Vec<String> = db
            .posts_for_user(user_id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Post new", "Post old", "Post undated"]);
    }

    #[tokio::test]
    async fn test_posts_for_user_respects_limit() {
        let (db, user_id, feed) = setup().await;
        for i in 0..5 {
            db.insert_post_if_absent(&post(feed.id, &i.to_string(), Some(i)))
                .await
                .unwrap();
        }
        assert_eq!(db.posts_for_user(user_id, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_feeds() {
        let (db, _, feed) = setup().await;
        let bob = db.create_user("bob").await.unwrap();
        db.insert_post_if_absent(&post(feed.id, "a", Some(1))).await.unwrap();
        assert!(db.posts_for_user(bob.id, 10).await.unwrap().is_empty());
    }
}
