//! Watch scope configuration
//!
//! A [`WatchScope`] is immutable once built: label prefix, subsystem, device
//! filter and the ordered identifier-tag to property mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::device::Device;

/// Device predicate shared by a scope's tasks
pub type FilterFn = Arc<dyn Fn(&Device) -> bool + Send + Sync>;

/// One identifier scheme: a short label-key suffix backed by a device property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierTag {
    pub tag: String,
    pub property: String,
}

impl IdentifierTag {
    pub fn new(tag: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            property: property.into(),
        }
    }
}

/// Declarative device filter, usable from configuration files
///
/// All conditions must hold. An empty filter matches every device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceFilter {
    /// Accepted device types, any type when empty
    #[serde(default)]
    pub devtypes: Vec<String>,
    /// Properties that must be present and non-empty
    #[serde(default)]
    pub require_properties: Vec<String>,
    /// Properties that must have exactly the given value
    #[serde(default)]
    pub match_properties: BTreeMap<String, String>,
}

impl DeviceFilter {
    pub fn devtype(devtype: impl Into<String>) -> Self {
        Self {
            devtypes: vec![devtype.into()],
            ..Default::default()
        }
    }

    pub fn matches(&self, device: &Device) -> bool {
        if !self.devtypes.is_empty() && !self.devtypes.iter().any(|t| *t == device.devtype) {
            return false;
        }
        if self
            .require_properties
            .iter()
            .any(|p| device.property(p).is_empty())
        {
            return false;
        }
        self.match_properties
            .iter()
            .all(|(name, value)| device.property(name) == value)
    }

    pub fn into_predicate(self) -> FilterFn {
        Arc::new(move |device: &Device| self.matches(device))
    }
}

/// Everything needed to watch one device class
#[derive(Clone)]
pub struct WatchScope {
    /// Label-key namespace, e.g. "node-devices.alpha.kubernetes.io"
    pub prefix: String,
    /// Device subsystem ("block", "net", ...)
    pub subsystem: String,
    pub filter: FilterFn,
    /// Identifier tags in priority order
    pub identifiers: Vec<IdentifierTag>,
}

impl WatchScope {
    pub fn new(
        prefix: impl Into<String>,
        subsystem: impl Into<String>,
        filter: FilterFn,
        identifiers: Vec<IdentifierTag>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            subsystem: subsystem.into(),
            filter,
            identifiers,
        }
    }

    /// Prefix of every label key this scope owns: "<prefix>/<subsystem>-"
    pub fn key_prefix(&self) -> String {
        format!("{}/{}-", self.prefix, self.subsystem)
    }

    pub fn accepts(&self, device: &Device) -> bool {
        (self.filter)(device)
    }
}

impl fmt::Debug for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchScope")
            .field("prefix", &self.prefix)
            .field("subsystem", &self.subsystem)
            .field("identifiers", &self.identifiers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(devtype: &str) -> Device {
        let mut device = Device {
            subsystem: "block".into(),
            devtype: devtype.into(),
            sysname: "sda".into(),
            ..Default::default()
        };
        device.properties.insert("ID_BUS".into(), "ata".into());
        device
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = DeviceFilter::default();
        assert!(filter.matches(&disk("disk")));
        assert!(filter.matches(&Device::default()));
    }

    #[test]
    fn test_devtype_filter() {
        let filter = DeviceFilter::devtype("disk");
        assert!(filter.matches(&disk("disk")));
        assert!(!filter.matches(&disk("partition")));
    }

    #[test]
    fn test_property_conditions() {
        let mut filter = DeviceFilter::devtype("disk");
        filter.require_properties.push("ID_BUS".into());
        filter.match_properties.insert("ID_BUS".into(), "ata".into());
        assert!(filter.matches(&disk("disk")));

        filter.match_properties.insert("ID_BUS".into(), "usb".into());
        assert!(!filter.matches(&disk("disk")));

        let filter = DeviceFilter {
            require_properties: vec!["ID_WWN".into()],
            ..Default::default()
        };
        assert!(!filter.matches(&disk("disk")));
    }

    #[test]
    fn test_scope_key_prefix() {
        let scope = WatchScope::new(
            "node-devices.alpha.kubernetes.io",
            "block",
            DeviceFilter::devtype("disk").into_predicate(),
            vec![IdentifierTag::new("wwn", "ID_WWN")],
        );
        assert_eq!(scope.key_prefix(), "node-devices.alpha.kubernetes.io/block-");
        assert!(scope.accepts(&disk("disk")));
        assert!(!scope.accepts(&disk("partition")));
    }
}
