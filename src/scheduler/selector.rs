use crate::storage::{Database, DatabaseError, Feed, User};

/// Pick the feed most overdue for a refresh.
///
/// A feed that was never fetched is more overdue than any fetched feed
/// (`None < Some(_)`); among equal timestamps the lowest id wins.
pub fn most_overdue<I>(feeds: I) -> Option<Feed>
where
    I: IntoIterator<Item = Feed>,
{
    feeds
        .into_iter()
        .min_by_key(|feed| (feed.last_fetched_at, feed.id))
}

/// Choose the next feed to refresh among those `user` follows.
///
/// Returns `Ok(None)` when the user follows nothing; callers treat that as
/// an idle tick.
pub async fn select_next_feed(db: &Database, user: &User) -> Result<Option<Feed>, DatabaseError> {
    let feeds = db.followed_feeds_by_fetch_time(user.id).await?;
    Ok(most_overdue(feeds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(id: i64, last_fetched_at: Option<i64>) -> Feed {
        Feed {
            id,
            name: format!("feed {}", id),
            url: format!("https://example.com/{}.xml", id),
            user_id: 1,
            created_at: 0,
            updated_at: 0,
            last_fetched_at,
        }
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(most_overdue(Vec::new()), None);
    }

    #[test]
    fn test_never_fetched_wins() {
        let picked = most_overdue(vec![feed(1, Some(10)), feed(2, None), feed(3, Some(5))]);
        assert_eq!(picked.map(|f| f.id), Some(2));
    }

    #[test]
    fn test_ties_break_by_id() {
        let picked = most_overdue(vec![feed(7, None), feed(3, None), feed(5, Some(1))]);
        assert_eq!(picked.map(|f| f.id), Some(3));
    }

    proptest! {
        #[test]
        fn prop_picks_earliest_timestamp(
            stamps in proptest::collection::btree_set(0i64..1_000_000, 1..20),
            include_unfetched in any::<bool>(),
            rotate in 0usize..20,
        ) {
            let mut feeds: Vec<Feed> = stamps
                .iter()
                .enumerate()
                .map(|(i, &ts)| feed(i as i64 + 1, Some(ts)))
                .collect();
            if include_unfetched {
                feeds.push(feed(1000, None));
            }
            let len = feeds.len();
            feeds.rotate_left(rotate % len);

            let picked = most_overdue(feeds).unwrap();
            if include_unfetched {
                prop_assert_eq!(picked.last_fetched_at, None);
            } else {
                prop_assert_eq!(picked.last_fetched_at, stamps.iter().next().copied());
            }
        }
    }

    #[tokio::test]
    async fn test_select_next_feed_from_follow_set() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();

        let fetched = db.create_feed("A", "https://a.example/feed", alice.id).await.unwrap();
        let unfollowed = db.create_feed("B", "https://b.example/feed", bob.id).await.unwrap();
        db.follow_feed(alice.id, fetched.id).await.unwrap();
        db.follow_feed(bob.id, unfollowed.id).await.unwrap();
        db.mark_feed_fetched(fetched.id, 100).await.unwrap();

        // Bob's never-fetched feed is not in Alice's follow set
        let picked = select_next_feed(&db, &alice).await.unwrap().unwrap();
        assert_eq!(picked.id, fetched.id);
    }

    #[tokio::test]
    async fn test_select_next_feed_none_without_follows() {
        let db = Database::open(":memory:").await.unwrap();
        let alice = db.create_user("alice").await.unwrap();
        assert_eq!(select_next_feed(&db, &alice).await.unwrap(), None);
    }
}
