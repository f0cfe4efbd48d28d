//! The aggregation loop: pick the most overdue followed feed, ingest it,
//! wait, repeat.

mod runner;
mod selector;

pub use runner::{Aggregator, LoopState, RunSummary, TickEvent, TickOutcome};
pub use selector::{most_overdue, select_next_feed};
