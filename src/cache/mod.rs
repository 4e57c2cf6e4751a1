//! Per-target state persisted across restarts.
//!
//! Lets a restarted watcher recognise programs that are still open in a
//! browser: if their artifact hash matches, no reload is forced.

mod state;

/// Cache directory name (inside the watch root)
pub(crate) const CACHE_DIR: &str = "elm-stuff/elm-watch";

#[cfg(test)]
pub use state::PersistedTarget;
pub use state::{PersistedFingerprint, PersistedState, persist_state, restore_state};
