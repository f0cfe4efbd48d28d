//! Feed retrieval, parsing and ingestion.
//!
//! - [`fetcher`] - one HTTP GET per feed with a fixed client label
//! - [`parser`] - RSS channel parsing with per-item validation
//! - [`ingest`] - mark fetched, fetch, parse, store new posts for one feed
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{ingest_feed, FeedFetcher, EntryPolicy};
//!
//! let fetcher = FeedFetcher::new("gator", Duration::from_secs(30))?;
//! let report = ingest_feed(&db, &fetcher, &feed, EntryPolicy::Lenient).await?;
//! println!("{} new posts", report.inserted.len());
//! ```

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{FeedFetcher, FetchCause, FetchError};
pub use ingest::{ingest_feed, IngestError, IngestReport};
pub use parser::{
    parse_channel, parse_channel_with, Channel, Entry, EntryPolicy, ParseError, ParseResult,
};
