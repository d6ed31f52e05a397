/*
 * This file is part of hw-tagger.
 *
 * Copyright (C) 2026 hw-tagger contributors
 *
 * hw-tagger is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hw-tagger is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hw-tagger. If not, see <https://www.gnu.org/licenses/>.
 */

//! One-shot device scan: which keys would each scope publish right now

use serde::Serialize;

use ht_core::{derive_keys, DeviceSource, WatchScope};
use ht_error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDevice {
    pub syspath: String,
    pub sysname: String,
    pub devtype: String,
    pub devnode: String,
    pub driver: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeScan {
    pub prefix: String,
    pub subsystem: String,
    pub devices: Vec<ScannedDevice>,
}

/// Enumerate every scope once
///
/// Devices rejected by a scope's filter are left out, accepted devices are
/// listed even when they derive no key.
pub fn scan_scopes(
    scopes: &[WatchScope],
    source: &dyn DeviceSource,
    subsystem: Option<&str>,
) -> Result<Vec<ScopeScan>> {
    let mut scans = Vec::new();
    for scope in scopes {
        if subsystem.is_some_and(|s| s != scope.subsystem) {
            continue;
        }
        let devices = source
            .enumerate(&scope.subsystem)?
            .into_iter()
            .filter(|device| scope.accepts(device))
            .map(|device| ScannedDevice {
                keys: derive_keys(scope, &device),
                syspath: device.syspath,
                sysname: device.sysname,
                devtype: device.devtype,
                devnode: device.devnode,
                driver: device.driver,
            })
            .collect();
        scans.push(ScopeScan {
            prefix: scope.prefix.clone(),
            subsystem: scope.subsystem.clone(),
            devices,
        });
    }
    Ok(scans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SavedConfig;
    use ht_core::{Device, DeviceMonitor, HwTaggerError};

    struct StaticSource(Vec<Device>);

    impl DeviceSource for StaticSource {
        fn enumerate(&self, subsystem: &str) -> Result<Vec<Device>> {
            Ok(self
                .0
                .iter()
                .filter(|d| d.subsystem == subsystem)
                .cloned()
                .collect())
        }

        fn subscribe(&self, subsystem: &str) -> Result<Box<dyn DeviceMonitor>> {
            Err(HwTaggerError::monitor_socket(subsystem, "not supported"))
        }
    }

    fn block(sysname: &str, devtype: &str, wwn: &str) -> Device {
        let mut device = Device {
            subsystem: "block".into(),
            devtype: devtype.into(),
            sysname: sysname.into(),
            syspath: format!("/sys/devices/virtual/block/{}", sysname),
            devnode: format!("/dev/{}", sysname),
            ..Default::default()
        };
        if !wwn.is_empty() {
            device.properties.insert("ID_WWN".into(), wwn.into());
        }
        device
    }

    #[test]
    fn test_scan_default_scope() {
        let source = StaticSource(vec![
            block("sda", "disk", "0x5000c500a1b2c3d4"),
            block("sda1", "partition", "0x5000c500a1b2c3d4"),
            block("sdb", "disk", ""),
        ]);
        let scopes = SavedConfig::default().into_scopes();

        let scans = scan_scopes(&scopes, &source, None).unwrap();
        assert_eq!(scans.len(), 1);
        let devices = &scans[0].devices;
        assert_eq!(devices.len(), 2);
        assert_eq!(
            devices[0].keys,
            vec!["node-devices.alpha.kubernetes.io/block-disk-wwn-0x5000c500a1b2c3d4"]
        );
        assert!(devices[1].keys.is_empty());
    }

    #[test]
    fn test_scan_subsystem_filter() {
        let source = StaticSource(vec![block("sda", "disk", "0x1")]);
        let scopes = SavedConfig::default().into_scopes();
        assert!(scan_scopes(&scopes, &source, Some("net")).unwrap().is_empty());
        assert_eq!(scan_scopes(&scopes, &source, Some("block")).unwrap().len(), 1);
    }
}
