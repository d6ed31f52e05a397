//! Device snapshots and add/remove events
//!
//! A [`Device`] is an immutable snapshot produced by the device backend, one
//! per enumeration entry or per monitor event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Snapshot of a single device as reported by the device backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub subsystem: String,
    /// Device type within the subsystem ("disk", "partition", ...), may be empty
    pub devtype: String,
    /// Absolute path under /sys
    pub syspath: String,
    /// Kernel device path, syspath without the /sys prefix
    pub devpath: String,
    pub sysname: String,
    /// Trailing instance number of the sysname, empty when there is none
    pub sysnum: String,
    /// Sysname of the parent device, empty for top-level devices
    pub parent_sysname: String,
    /// Device node ("/dev/sda"), empty when the device has none
    pub devnode: String,
    pub driver: String,
    pub properties: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

impl Device {
    /// Property value, treating a missing property as empty
    pub fn property(&self, name: &str) -> &str {
        self.properties.get(name).map(String::as_str).unwrap_or("")
    }
}

/// What happened to a device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceAction {
    Add,
    Remove,
    /// Anything else the backend reports ("change", "bind", ...)
    Other(String),
}

impl DeviceAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "add" => Self::Add,
            "remove" => Self::Remove,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device add/remove notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub action: DeviceAction,
    pub device: Option<Device>,
}

impl DeviceEvent {
    pub fn new(action: DeviceAction, device: Device) -> Self {
        Self {
            action,
            device: Some(device),
        }
    }

    pub fn add(device: Device) -> Self {
        Self::new(DeviceAction::Add, device)
    }

    pub fn remove(device: Device) -> Self {
        Self::new(DeviceAction::Remove, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(DeviceAction::parse("add"), DeviceAction::Add);
        assert_eq!(DeviceAction::parse("remove"), DeviceAction::Remove);
        assert_eq!(
            DeviceAction::parse("change"),
            DeviceAction::Other("change".to_string())
        );
        assert_eq!(DeviceAction::parse("bind").to_string(), "bind");
    }

    #[test]
    fn test_missing_property_is_empty() {
        let mut device = Device::default();
        device.properties.insert("ID_WWN".into(), "0x5000".into());
        assert_eq!(device.property("ID_WWN"), "0x5000");
        assert_eq!(device.property("ID_SERIAL_SHORT"), "");
    }
}
