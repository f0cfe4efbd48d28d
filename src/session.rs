//! Resolves the configured user name into a [`User`].
//!
//! Commands receive the resulting value explicitly; nothing reads the
//! current user from process-wide state.

use crate::config::Config;
use crate::storage::{Database, DatabaseError, User};

/// The user named by `config.current_user_name`, if any and if registered.
pub async fn current_user(db: &Database, config: &Config) -> Result<Option<User>, DatabaseError> {
    match config.current_user_name.as_deref() {
        Some(name) if !name.trim().is_empty() => db.get_user_by_name(name).await,
        _ => Ok(None),
    }
}
