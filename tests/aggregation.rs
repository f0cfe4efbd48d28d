//! End-to-end tests for the aggregation loop: selection order, ingestion,
//! failure tolerance and cancellation.
//!
//! Each test gets its own in-memory SQLite database and mock HTTP server.

use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gator::feed::FeedFetcher;
use gator::scheduler::{Aggregator, LoopState, TickOutcome};
use gator::storage::{Database, Feed, User};

fn channel(title: &str, items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link)| {
            format!(
                "<item><title>{}</title><link>{}</link><description>about {}</description>\
                 <pubDate>Mon, 06 Jan 2025 10:00:00 +0000</pubDate></item>",
                title, link, title
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
<title>{}</title><link>https://example.com</link>
<atom:link href="https://example.com/rss" rel="self" type="application/rss+xml"/>
<description>test channel</description>
{}
</channel></rss>"#,
        title, items
    )
}

async fn mount(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/rss+xml"),
        )
        .mount(server)
        .await;
}

async fn setup() -> (Database, User) {
    let db = Database::open(":memory:").await.unwrap();
    let user = db.create_user("alice").await.unwrap();
    (db, user)
}

async fn add_followed(db: &Database, user: &User, name: &str, url: &str) -> Feed {
    let feed = db.create_feed(name, url, user.id).await.unwrap();
    db.follow_feed(user.id, feed.id).await.unwrap();
    feed
}

fn fetcher() -> FeedFetcher {
    FeedFetcher::new("gator-test", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_never_fetched_feed_is_polled_first() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a.xml",
        channel("A", &[("A1", "https://a.example/1"), ("A2", "https://a.example/2")]),
    )
    .await;
    mount(&server, "/b.xml", channel("B", &[("B1", "https://b.example/1")])).await;

    let (db, user) = setup().await;
    let a = add_followed(&db, &user, "A", &format!("{}/a.xml", server.uri())).await;
    let b = add_followed(&db, &user, "B", &format!("{}/b.xml", server.uri())).await;
    let hour_ago = chrono::Utc::now().timestamp() - 3600;
    db.mark_feed_fetched(b.id, hour_ago).await.unwrap();

    let aggregator = Aggregator::new(db.clone(), fetcher(), user.clone(), Duration::from_secs(60));

    let TickOutcome::Ingested(first) = aggregator.tick().await else {
        panic!("first tick should ingest A");
    };
    assert_eq!(first.feed_id, a.id);
    assert_eq!(first.inserted, vec!["A1".to_string(), "A2".to_string()]);
    assert_eq!(db.posts_for_feed(b.id).await.unwrap().len(), 0);

    let TickOutcome::Ingested(second) = aggregator.tick().await else {
        panic!("second tick should ingest B");
    };
    assert_eq!(second.feed_id, b.id);
    assert_eq!(second.inserted, vec!["B1".to_string()]);

    // Both fetched now; A was fetched earlier in this test, so it comes round again
    let TickOutcome::Ingested(third) = aggregator.tick().await else {
        panic!("third tick should revisit A");
    };
    assert_eq!(third.feed_id, a.id);
    assert!(third.inserted.is_empty());
    assert_eq!(third.already_known, 2);

    let posts = db.posts_for_user(user.id, 10).await.unwrap();
    assert_eq!(posts.len(), 3);
}

#[tokio::test]
async fn test_failures_do_not_stop_the_loop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (db, user) = setup().await;
    let url = format!("{}/broken.xml", server.uri());
    add_followed(&db, &user, "Broken", &url).await;

    let (tx, mut rx) = mpsc::channel(8);
    let aggregator =
        Aggregator::new(db, fetcher(), user, Duration::from_millis(20)).with_events(tx);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(aggregator.run(cancel.clone()));

    for expected_tick in 1..=2 {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.tick, expected_tick);
        match event.outcome {
            TickOutcome::Failed(e) => assert_eq!(e.feed_url(), url),
            other => panic!("expected a failed tick, got {:?}", other),
        }
    }

    cancel.cancel();
    let summary = handle.await.unwrap();
    assert!(summary.ticks >= 2);
    assert_eq!(summary.failed, summary.ticks);
    assert_eq!(summary.ingested, 0);
}

#[tokio::test]
async fn test_cancel_lets_in_flight_tick_finish() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(channel("Slow", &[("S1", "https://slow.example/1")]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let (db, user) = setup().await;
    let feed = add_followed(&db, &user, "Slow", &format!("{}/slow.xml", server.uri())).await;

    let (tx, mut rx) = mpsc::channel(8);
    let aggregator = Aggregator::new(db.clone(), fetcher(), user, Duration::from_millis(10))
        .with_events(tx);
    let mut state = aggregator.state();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(aggregator.run(cancel.clone()));

    state
        .wait_for(|s| *s == LoopState::Running)
        .await
        .unwrap();
    cancel.cancel();

    let summary = handle.await.unwrap();
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.ingested, 1);
    assert_eq!(*state.borrow(), LoopState::Stopped);

    let event = rx.recv().await.unwrap();
    assert!(matches!(event.outcome, TickOutcome::Ingested(_)));
    assert!(rx.recv().await.is_none());

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(db.posts_for_feed(feed.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_feed_writes_no_posts() {
    let server = MockServer::start().await;
    mount(&server, "/bad.xml", "<html><body>not a feed</body></html>".to_string()).await;

    let (db, user) = setup().await;
    let feed = add_followed(&db, &user, "Bad", &format!("{}/bad.xml", server.uri())).await;

    let aggregator = Aggregator::new(db.clone(), fetcher(), user, Duration::from_secs(60));
    assert!(matches!(aggregator.tick().await, TickOutcome::Failed(_)));

    assert_eq!(db.posts_for_feed(feed.id).await.unwrap().len(), 0);
    // Still marked fetched, so it yields to other feeds next time
    let stored = db.get_feed_by_url(&feed.url).await.unwrap().unwrap();
    assert!(stored.last_fetched_at.is_some());
}

#[tokio::test]
async fn test_unfollowed_feed_is_not_polled() {
    let server = MockServer::start().await;
    mount(&server, "/a.xml", channel("A", &[("A1", "https://a.example/1")])).await;

    let (db, user) = setup().await;
    let feed = add_followed(&db, &user, "A", &format!("{}/a.xml", server.uri())).await;
    assert!(db.unfollow_feed(user.id, feed.id).await.unwrap());

    let aggregator = Aggregator::new(db, fetcher(), user, Duration::from_secs(60));
    assert!(matches!(aggregator.tick().await, TickOutcome::Skipped));
    assert_eq!(server.received_requests().await.unwrap().len(), 0);
}
