//! hw-tagger Core Library
//!
//! Keeps a host's device-identifier labels in sync with the hardware that
//! is actually present.
//!
//! # Module Structure
//!
//! - `data/` - Device snapshots, watch scopes, label sets and diffs
//! - `engine/` - Key normalization, state tracking, reconciliation, watchers
//! - `backend` - Interfaces to the device subsystem and the label store
//!
//! # Example
//!
//! ```no_run
//! use ht_core::{normalize_key, DeviceFilter, IdentifierTag, WatchScope};
//!
//! let scope = WatchScope::new(
//!     "node-devices.alpha.kubernetes.io",
//!     "block",
//!     DeviceFilter::devtype("disk").into_predicate(),
//!     vec![IdentifierTag::new("wwn", "ID_WWN")],
//! );
//! let key = normalize_key("node-devices.alpha.kubernetes.io/block-disk-wwn-0x5000c500");
//! ```

pub mod backend;
pub mod constants;
pub mod data;
pub mod engine;

pub use backend::{DeviceMonitor, DeviceSource, LabelStore};

pub use data::{
    Device, DeviceAction, DeviceEvent, DeviceFilter, FilterFn, IdentifierTag, LabelDiff,
    LabelSet, NodeLabels, WatchScope,
};

pub use engine::{
    derive_keys, is_label_char, normalize_key, normalize_name, run_watchers, EventFeed,
    Reconciler, StateTracker, SyncOutcome, SyncSignal, WatchSettings, Watcher,
};

pub use ht_error::{HwTaggerError, Result};
