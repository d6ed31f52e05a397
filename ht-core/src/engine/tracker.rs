//! Known-key state tracking
//!
//! Holds the set of label keys that should currently exist for one scope.
//! Each key remembers which devices (by syspath) contribute it, so a key
//! shared by two devices survives the removal of one of them.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::key::normalize_key;
use crate::data::{Device, DeviceAction, DeviceEvent, WatchScope};

/// Derive the normalized label keys a device contributes to a scope
///
/// One key per identifier tag whose backing property is non-empty, in
/// identifier order.
pub fn derive_keys(scope: &WatchScope, device: &Device) -> Vec<String> {
    scope
        .identifiers
        .iter()
        .filter_map(|id| {
            let value = device.property(&id.property);
            if value.is_empty() {
                return None;
            }
            let raw = format!(
                "{}/{}-{}-{}-{}",
                scope.prefix, scope.subsystem, device.devtype, id.tag, value
            );
            Some(normalize_key(&raw))
        })
        .collect()
}

/// In-memory KnownKeys for one scope
#[derive(Debug, Default)]
pub struct StateTracker {
    /// key -> syspaths of the devices backing it
    contributors: BTreeMap<String, BTreeSet<String>>,
    /// syspath -> keys the device contributed
    by_device: BTreeMap<String, BTreeSet<String>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one device event, returning whether the key set changed
    pub fn apply(&mut self, event: &DeviceEvent, scope: &WatchScope) -> bool {
        let device = match &event.device {
            Some(device) => device,
            None => return false,
        };
        if !scope.accepts(device) {
            debug!(syspath = %device.syspath, "Device filtered out");
            return false;
        }

        match &event.action {
            DeviceAction::Add => derive_keys(scope, device)
                .into_iter()
                .fold(false, |changed, key| self.insert(key, &device.syspath) || changed),
            DeviceAction::Remove => {
                let mut keys: BTreeSet<String> = derive_keys(scope, device).into_iter().collect();
                if let Some(recorded) = self.by_device.get(&device.syspath) {
                    keys.extend(recorded.iter().cloned());
                }
                keys.into_iter()
                    .fold(false, |changed, key| self.remove(&key, &device.syspath) || changed)
            }
            DeviceAction::Other(action) => {
                warn!(
                    syspath = %device.syspath,
                    "Unknown action: {}", action
                );
                false
            }
        }
    }

    fn insert(&mut self, key: String, syspath: &str) -> bool {
        self.by_device
            .entry(syspath.to_string())
            .or_default()
            .insert(key.clone());
        let devices = self.contributors.entry(key.clone()).or_default();
        let was_absent = devices.is_empty();
        devices.insert(syspath.to_string());
        if was_absent {
            info!("Add key: {}", key);
        }
        was_absent
    }

    fn remove(&mut self, key: &str, syspath: &str) -> bool {
        if let Some(keys) = self.by_device.get_mut(syspath) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_device.remove(syspath);
            }
        }
        let Some(devices) = self.contributors.get_mut(key) else {
            return false;
        };
        if !devices.remove(syspath) || !devices.is_empty() {
            return false;
        }
        self.contributors.remove(key);
        info!("Remove key: {}", key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contributors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Snapshot of the keys that should currently exist
    pub fn known_keys(&self) -> BTreeSet<String> {
        self.contributors.keys().cloned().collect()
    }
}
