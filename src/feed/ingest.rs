use thiserror::Error;

use super::fetcher::{FeedFetcher, FetchError};
use super::parser::{parse_channel_with, EntryPolicy, ParseError};
use crate::storage::{Database, DatabaseError, Feed, InsertOutcome, NewPost};

/// Why an ingestion attempt failed. Every variant carries the feed URL.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("Storage error while ingesting {url}: {source}")]
    Store {
        url: String,
        #[source]
        source: DatabaseError,
    },
}

impl IngestError {
    /// URL of the feed the failure belongs to
    pub fn feed_url(&self) -> &str {
        match self {
            IngestError::Fetch(e) => &e.url,
            IngestError::Parse { url, .. } | IngestError::Store { url, .. } => url,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub feed_id: i64,
    pub feed_url: String,
    /// Channel title as published by the feed
    pub channel_title: String,
    /// Titles of newly stored posts, in document order
    pub inserted: Vec<String>,
    /// Entries whose link was already stored
    pub already_known: usize,
    /// Items dropped by the parser (missing fields or invalid link)
    pub skipped: usize,
}

/// Ingest one feed: mark it fetched, fetch, parse, store new posts.
///
/// The fetch timestamp is written before any network I/O and is not rolled
/// back when a later step fails, so a permanently broken feed moves to the
/// back of the queue instead of being retried every tick.
///
/// Posts are inserted one by one with insert-if-absent semantics keyed by
/// link; running this twice over the same document stores nothing new the
/// second time.
pub async fn ingest_feed(
    db: &Database,
    fetcher: &FeedFetcher,
    feed: &Feed,
    policy: EntryPolicy,
) -> Result<IngestReport, IngestError> {
    let store_err = |source| IngestError::Store {
        url: feed.url.clone(),
        source,
    };

    let now = chrono::Utc::now().timestamp();
    db.mark_feed_fetched(feed.id, now).await.map_err(store_err)?;

    let body = fetcher.fetch(&feed.url).await?;

    let parsed = parse_channel_with(&body, policy).map_err(|source| IngestError::Parse {
        url: feed.url.clone(),
        source,
    })?;

    if parsed.skipped > 0 {
        tracing::warn!(
            feed = %feed.url,
            skipped = parsed.skipped,
            "Items with missing fields or invalid links skipped"
        );
    }

    let mut report = IngestReport {
        feed_id: feed.id,
        feed_url: feed.url.clone(),
        channel_title: parsed.channel.title,
        inserted: Vec::new(),
        already_known: 0,
        skipped: parsed.skipped,
    };

    for entry in parsed.channel.entries {
        let post = NewPost {
            feed_id: feed.id,
            published_at: entry.published_at(),
            title: entry.title,
            url: entry.link,
            description: entry.description,
        };

        match db.insert_post_if_absent(&post).await.map_err(store_err)? {
            InsertOutcome::Inserted => report.inserted.push(post.title),
            InsertOutcome::Skipped => report.already_known += 1,
        }
    }

    tracing::info!(
        feed = %feed.url,
        inserted = report.inserted.len(),
        already_known = report.already_known,
        "Feed ingested"
    );

    Ok(report)
}
