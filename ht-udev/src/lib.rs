//! udev binding for hw-tagger
//!
//! Implements [`DeviceSource`] on Linux without linking libudev:
//!
//! - **Enumeration**: sysfs (`/sys/class/<subsystem>`) plus the udev
//!   database (`/run/udev/data`)
//! - **Monitoring**: the udev netlink multicast group
//!
//! # Example
//!
//! ```no_run
//! use ht_core::DeviceSource;
//! use ht_udev::UdevSource;
//!
//! let source = UdevSource::new();
//! let disks = source.enumerate("block").unwrap();
//! ```

pub mod db;
pub mod monitor;
pub mod sysfs;

use std::path::PathBuf;

use ht_core::{Device, DeviceMonitor, DeviceSource};
use ht_error::Result;

pub use monitor::NetlinkMonitor;
pub use sysfs::enumerate_subsystem;

/// Filesystem locations the backend reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdevPaths {
    pub sys_root: PathBuf,
    pub udev_data: PathBuf,
    pub dev_root: PathBuf,
}

impl Default for UdevPaths {
    fn default() -> Self {
        Self {
            sys_root: PathBuf::from("/sys"),
            udev_data: PathBuf::from("/run/udev/data"),
            dev_root: PathBuf::from("/dev"),
        }
    }
}

/// udev-backed device source
#[derive(Debug, Clone, Default)]
pub struct UdevSource {
    paths: UdevPaths,
}

impl UdevSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(paths: UdevPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &UdevPaths {
        &self.paths
    }
}

impl DeviceSource for UdevSource {
    fn enumerate(&self, subsystem: &str) -> Result<Vec<Device>> {
        enumerate_subsystem(&self.paths, subsystem)
    }

    fn subscribe(&self, subsystem: &str) -> Result<Box<dyn DeviceMonitor>> {
        let monitor = NetlinkMonitor::open(subsystem, self.paths.clone())?;
        Ok(Box::new(monitor))
    }
}
