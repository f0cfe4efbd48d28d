//! gator: a command-line feed aggregator.
//!
//! Users follow RSS feeds; the aggregation loop polls the most overdue
//! followed feed on a fixed interval and stores each new post exactly once,
//! keyed by its link.

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod util;
