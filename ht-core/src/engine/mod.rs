//! Reconciliation engine
//!
//! Event feed -> state tracker -> reconciler, driven per scope by a watcher.

mod feed;
mod key;
mod reconcile;
mod tracker;
mod watcher;

pub use feed::{EventFeed, SyncSignal};
pub use key::{is_label_char, normalize_key, normalize_name};
pub use reconcile::{Reconciler, SyncOutcome};
pub use tracker::{derive_keys, StateTracker};
pub use watcher::{run_watchers, WatchSettings, Watcher};
