//! Utility functions for common operations.
//!
//! - **URL validation**: entry link shape checks and SSRF guards for feed URLs
//! - **Durations**: the `30s` / `1m` / `1h30m` notation used for the poll interval

mod duration;
mod url_validator;

pub use duration::{format_duration, parse_duration, InvalidDuration};
pub use url_validator::{validate_feed_url, validate_link, UrlValidationError};
