//! Label sets and the three-way label diff

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Labels of one host, key to value
pub type LabelSet = BTreeMap<String, String>;

/// A host's labels as fetched from the label store
///
/// The resource version is handed back on update so the store can reject
/// writes based on a stale read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLabels {
    pub labels: LabelSet,
    pub resource_version: Option<String>,
}

impl NodeLabels {
    pub fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            resource_version: None,
        }
    }
}

/// Mutation needed to make the external labels match the known keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelDiff {
    /// Owned keys present externally that no device backs anymore
    pub removed: Vec<String>,
    /// Known keys missing externally
    pub added: Vec<String>,
    /// Known keys present externally with another value
    pub changed: Vec<String>,
    /// Value written for added and changed keys
    #[serde(skip)]
    pub value: String,
}

impl LabelDiff {
    /// Compute the diff for keys under `owned_prefix`
    ///
    /// Keys outside the prefix are never scheduled for removal.
    pub fn compute(
        current: &LabelSet,
        owned_prefix: &str,
        known: &BTreeSet<String>,
        value: &str,
    ) -> Self {
        let removed = current
            .keys()
            .filter(|key| key.starts_with(owned_prefix) && !known.contains(*key))
            .cloned()
            .collect();

        let mut added = Vec::new();
        let mut changed = Vec::new();
        for key in known {
            match current.get(key) {
                Some(v) if v == value => {}
                Some(_) => changed.push(key.clone()),
                None => added.push(key.clone()),
            }
        }

        Self {
            removed,
            added,
            changed,
            value: value.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }

    /// Apply the diff onto a full label set, leaving unrelated keys untouched
    pub fn apply(&self, labels: &mut LabelSet) {
        for key in &self.removed {
            labels.remove(key);
        }
        for key in self.added.iter().chain(&self.changed) {
            labels.insert(key.clone(), self.value.clone());
        }
    }
}
