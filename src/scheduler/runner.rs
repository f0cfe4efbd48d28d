use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::selector::select_next_feed;
use crate::feed::{ingest_feed, EntryPolicy, FeedFetcher, IngestError, IngestReport};
use crate::storage::{Database, DatabaseError, User};
use crate::util::format_duration;

/// Lifecycle of the aggregation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Between ticks (or not started yet)
    Idle,
    /// A tick is in flight
    Running,
    /// Cancelled; `run` has returned or is about to
    Stopped,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The user follows no feeds
    Skipped,
    Ingested(IngestReport),
    Failed(IngestError),
    /// The follow set could not be read
    SelectionFailed(DatabaseError),
}

/// Emitted after every tick.
#[derive(Debug)]
pub struct TickEvent {
    /// 1-based tick number
    pub tick: u64,
    pub outcome: TickOutcome,
}

/// Counters returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub ingested: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Skipped => self.skipped += 1,
            TickOutcome::Ingested(_) => self.ingested += 1,
            TickOutcome::Failed(_) | TickOutcome::SelectionFailed(_) => self.failed += 1,
        }
    }
}

/// Polls one user's followed feeds, one feed per tick, until cancelled.
///
/// The next tick is scheduled `interval` after the previous one settles, so
/// ticks never overlap and a feed is never fetched concurrently with itself.
/// Per-tick failures are logged and reported but never stop the loop.
pub struct Aggregator {
    db: Database,
    fetcher: FeedFetcher,
    user: User,
    interval: Duration,
    policy: EntryPolicy,
    events: Option<mpsc::Sender<TickEvent>>,
    state: watch::Sender<LoopState>,
}

impl Aggregator {
    pub fn new(db: Database, fetcher: FeedFetcher, user: User, interval: Duration) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            db,
            fetcher,
            user,
            interval,
            policy: EntryPolicy::default(),
            events: None,
            state,
        }
    }

    /// Set how items with invalid links are treated.
    pub fn with_policy(mut self, policy: EntryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Send a [`TickEvent`] to `tx` after every tick.
    pub fn with_events(mut self, tx: mpsc::Sender<TickEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Observe the loop state.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run one tick: select the most overdue feed and ingest it.
    pub async fn tick(&self) -> TickOutcome {
        let feed = match select_next_feed(&self.db, &self.user).await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                tracing::debug!(user = %self.user.name, "No followed feeds, nothing to fetch");
                return TickOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(user = %self.user.name, error = %e, "Failed to select next feed");
                return TickOutcome::SelectionFailed(e);
            }
        };

        tracing::debug!(feed = %feed.url, last_fetched_at = ?feed.last_fetched_at, "Selected feed");

        match ingest_feed(&self.db, &self.fetcher, &feed, self.policy).await {
            Ok(report) => TickOutcome::Ingested(report),
            Err(e) => {
                tracing::warn!(feed = %e.feed_url(), error = %e, "Feed ingestion failed");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick until `cancel` fires.
    ///
    /// The first tick starts immediately. Cancellation is checked between
    /// ticks only: a tick that has started always runs to completion.
    pub async fn run(self, cancel: CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();

        tracing::info!(
            user = %self.user.name,
            interval = %format_duration(self.interval),
            "Aggregation loop started"
        );

        while !cancel.is_cancelled() {
            self.state.send_replace(LoopState::Running);
            let outcome = self.tick().await;
            summary.record(&outcome);
            self.state.send_replace(LoopState::Idle);

            self.emit(TickEvent {
                tick: summary.ticks,
                outcome,
            })
            .await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.send_replace(LoopState::Stopped);
        tracing::info!(
            ticks = summary.ticks,
            ingested = summary.ingested,
            failed = summary.failed,
            skipped = summary.skipped,
            "Aggregation loop stopped"
        );
        summary
    }

    async fn emit(&self, event: TickEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event).await {
                tracing::debug!(tick = e.0.tick, "Tick event receiver dropped");
            }
        }
    }
}
