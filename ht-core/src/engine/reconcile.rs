//! Label reconciliation
//!
//! Brings the host's labels under a scope's key prefix in line with the
//! scope's known keys. Nothing is written while the baseline is incomplete,
//! and nothing is written when the labels already match.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::LabelStore;
use crate::constants::labels::PRESENT_VALUE;
use crate::data::{LabelDiff, WatchScope};
use ht_error::Result;

/// What a sync call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Baseline not complete yet, the store was not contacted
    Deferred,
    /// Labels already matched
    InSync,
    /// Diff computed and logged, update suppressed
    DryRun(LabelDiff),
    /// Full label set written back
    Updated(LabelDiff),
}

/// Per-scope reconciler holding the CanSync gate
pub struct Reconciler {
    host: String,
    store: Arc<dyn LabelStore>,
    dry_run: bool,
    can_sync: bool,
}

impl Reconciler {
    pub fn new(host: impl Into<String>, store: Arc<dyn LabelStore>, dry_run: bool) -> Self {
        Self {
            host: host.into(),
            store,
            dry_run,
            can_sync: false,
        }
    }

    /// Open the gate once the enumeration baseline is complete
    pub fn enable(&mut self) {
        self.can_sync = true;
    }

    pub fn can_sync(&self) -> bool {
        self.can_sync
    }

    pub async fn sync(&self, scope: &WatchScope, known: &BTreeSet<String>) -> Result<SyncOutcome> {
        if !self.can_sync {
            debug!(subsystem = %scope.subsystem, "Baseline incomplete, deferring sync");
            return Ok(SyncOutcome::Deferred);
        }

        let mut node = self.store.get_labels(&self.host).await?;
        let diff = LabelDiff::compute(&node.labels, &scope.key_prefix(), known, PRESENT_VALUE);
        if diff.is_empty() {
            debug!(host = %self.host, subsystem = %scope.subsystem, "Labels in sync");
            return Ok(SyncOutcome::InSync);
        }

        for key in &diff.removed {
            info!("Removing label {}", key);
        }
        for key in &diff.added {
            info!("Adding label {}={}", key, diff.value);
        }
        for key in &diff.changed {
            info!("Setting label {}={}", key, diff.value);
        }
        diff.apply(&mut node.labels);

        if self.dry_run {
            info!(
                "Dry run, not updating node {}. Labels would be: {}",
                self.host,
                json_labels(&node.labels)
            );
            return Ok(SyncOutcome::DryRun(diff));
        }

        info!("Updating node {}", self.host);
        self.store.update_labels(&self.host, node).await?;
        Ok(SyncOutcome::Updated(diff))
    }
}

fn json_labels(labels: &crate::data::LabelSet) -> String {
    serde_json::to_string_pretty(labels).unwrap_or_else(|_| format!("{:?}", labels))
}
