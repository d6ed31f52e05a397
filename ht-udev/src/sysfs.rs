//! Device enumeration from sysfs
//!
//! Devices of a subsystem are listed from `<sys>/class/<subsystem>` (or
//! `<sys>/bus/<subsystem>/devices`). Each entry is resolved to its canonical
//! syspath and read into a [`Device`]:
//!
//! - `uevent` (`KEY=VALUE` lines) provides the kernel properties
//! - the udev database record adds udev properties and tags
//! - readable top-level attribute files become attributes

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::db;
use crate::UdevPaths;
use ht_core::Device;
use ht_error::{HwTaggerError, Result};

/// Largest attribute file read into a snapshot
const MAX_ATTRIBUTE_SIZE: u64 = 4096;

/// Enumerate all devices of a subsystem
pub fn enumerate_subsystem(paths: &UdevPaths, subsystem: &str) -> Result<Vec<Device>> {
    let class_dir = paths.sys_root.join("class").join(subsystem);
    let bus_dir = paths.sys_root.join("bus").join(subsystem).join("devices");
    let dir = if class_dir.is_dir() {
        class_dir
    } else if bus_dir.is_dir() {
        bus_dir
    } else {
        warn!("No sysfs directory for subsystem {}", subsystem);
        return Ok(Vec::new());
    };
    debug!("Scanning {} devices in {:?}", subsystem, dir);

    let sys_root = fs::canonicalize(&paths.sys_root)
        .map_err(|e| HwTaggerError::enumeration(subsystem, e))?;
    let entries = fs::read_dir(&dir).map_err(|e| HwTaggerError::enumeration(subsystem, e))?;

    let mut devices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HwTaggerError::enumeration(subsystem, e))?;
        let syspath = match fs::canonicalize(entry.path()) {
            Ok(p) => p,
            Err(e) => {
                // raced with a removal
                trace!("Skipping {:?}: {}", entry.path(), e);
                continue;
            }
        };
        match read_device(paths, &sys_root, &syspath, subsystem) {
            Ok(device) => devices.push(device),
            Err(e) => trace!("Skipping {:?}: {}", syspath, e),
        }
    }

    devices.sort_by(|a, b| a.syspath.cmp(&b.syspath));
    Ok(devices)
}

/// Build a device snapshot from a canonical syspath
pub fn read_device(
    paths: &UdevPaths,
    sys_root: &Path,
    syspath: &Path,
    fallback_subsystem: &str,
) -> Result<Device> {
    let uevent_path = syspath.join("uevent");
    let uevent = fs::read_to_string(&uevent_path).map_err(|source| HwTaggerError::FileRead {
        path: uevent_path,
        source,
    })?;
    let mut properties = parse_uevent(&uevent);

    let subsystem = link_name(&syspath.join("subsystem"))
        .unwrap_or_else(|| fallback_subsystem.to_string());
    let sysname = path_sysname(syspath);
    let devpath = syspath
        .strip_prefix(sys_root)
        .map(|p| format!("/{}", p.display()))
        .unwrap_or_else(|_| syspath.display().to_string());
    let devnode = properties
        .get("DEVNAME")
        .map(|name| devnode_path(paths, name))
        .unwrap_or_default();
    let driver = link_name(&syspath.join("driver"))
        .or_else(|| properties.get("DRIVER").cloned())
        .unwrap_or_default();

    properties.insert("DEVPATH".into(), devpath.clone());
    properties.insert("SUBSYSTEM".into(), subsystem.clone());
    if !devnode.is_empty() {
        properties.insert("DEVNAME".into(), devnode.clone());
    }

    let mut tags = BTreeMap::new();
    let record_id = db::record_id(&subsystem, &sysname, &properties);
    if let Some(record) = db::read_record(&paths.udev_data, &record_id) {
        properties.extend(record.properties);
        tags.extend(record.tags);
    }

    Ok(Device {
        devtype: properties.get("DEVTYPE").cloned().unwrap_or_default(),
        syspath: syspath.display().to_string(),
        sysnum: sysnum(&sysname),
        parent_sysname: parent_sysname(sys_root, syspath),
        attributes: read_attributes(syspath),
        subsystem,
        devpath,
        sysname,
        devnode,
        driver,
        properties,
        tags,
    })
}

/// Parse the `KEY=VALUE` lines of a uevent file or message
pub fn parse_uevent(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Sysname of a device path; udev maps '!' in kernel names to '/'
pub fn path_sysname(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().replace('!', "/"))
        .unwrap_or_default()
}

/// Trailing decimal digits of a sysname ("sda1" -> "1")
pub fn sysnum(sysname: &str) -> String {
    let digits = sysname
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    sysname[sysname.len() - digits..].to_string()
}

pub fn devnode_path(paths: &UdevPaths, devname: &str) -> String {
    if devname.starts_with('/') {
        devname.to_string()
    } else {
        paths.dev_root.join(devname).display().to_string()
    }
}

/// Sysname of the nearest ancestor that is itself a device
fn parent_sysname(sys_root: &Path, syspath: &Path) -> String {
    let devices_root = sys_root.join("devices");
    let mut current: Option<PathBuf> = syspath.parent().map(Path::to_path_buf);
    while let Some(dir) = current {
        if !dir.starts_with(&devices_root) || dir == devices_root {
            break;
        }
        if dir.join("uevent").is_file() {
            return path_sysname(&dir);
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    String::new()
}

/// Final component of a symlink target
fn link_name(link: &Path) -> Option<String> {
    fs::read_link(link)
        .ok()
        .and_then(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
}

/// Read the readable, small, regular attribute files directly under a syspath
fn read_attributes(syspath: &Path) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let entries = match fs::read_dir(syspath) {
        Ok(entries) => entries,
        Err(_) => return attributes,
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "uevent" {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        // symlinks (subsystem, driver, ...) are not followed by DirEntry::metadata
        if !meta.is_file() || meta.permissions().mode() & 0o444 == 0 || meta.len() > MAX_ATTRIBUTE_SIZE {
            continue;
        }
        if let Ok(value) = fs::read_to_string(entry.path()) {
            attributes.insert(name, value.trim_end().to_string());
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Lay out a minimal sysfs + udev db with one disk and its partition
    fn fixture() -> (TempDir, UdevPaths) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sys = root.join("sys");
        let host = sys.join("devices/pci0000:00/0000:00:17.0/ata1/host0/target0:0:0/0:0:0:0");
        let disk = host.join("block/sda");
        let part = disk.join("sda1");
        fs::create_dir_all(&part).unwrap();
        fs::create_dir_all(sys.join("class/block")).unwrap();

        fs::write(host.join("uevent"), "DEVTYPE=scsi_device\n").unwrap();
        fs::write(
            disk.join("uevent"),
            "MAJOR=8\nMINOR=0\nDEVNAME=sda\nDEVTYPE=disk\nDISKSEQ=1\n",
        )
        .unwrap();
        fs::write(disk.join("size"), "1953525168\n").unwrap();
        fs::write(disk.join("removable"), "0\n").unwrap();
        fs::write(
            part.join("uevent"),
            "MAJOR=8\nMINOR=1\nDEVNAME=sda1\nDEVTYPE=partition\nPARTN=1\n",
        )
        .unwrap();
        symlink(sys.join("class/block"), disk.join("subsystem")).unwrap();
        symlink(sys.join("class/block"), part.join("subsystem")).unwrap();
        symlink(&disk, sys.join("class/block/sda")).unwrap();
        symlink(&part, sys.join("class/block/sda1")).unwrap();

        let data = root.join("run/udev/data");
        fs::create_dir_all(&data).unwrap();
        fs::write(
            data.join("b8:0"),
            "S:disk/by-id/wwn-0x5000c500a1b2c3d4\nI:1234\nE:ID_WWN=0x5000c500a1b2c3d4\nE:ID_SERIAL_SHORT=Z1D2ABCD\nG:systemd\nQ:systemd\n",
        )
        .unwrap();

        let paths = UdevPaths {
            sys_root: sys,
            udev_data: data,
            dev_root: PathBuf::from("/dev"),
        };
        (dir, paths)
    }

    #[test]
    fn test_parse_uevent() {
        let props = parse_uevent("MAJOR=8\nMINOR=0\nDEVNAME=sda\n\ngarbage\n");
        assert_eq!(props.len(), 3);
        assert_eq!(props["DEVNAME"], "sda");
    }

    #[test]
    fn test_sysnum() {
        assert_eq!(sysnum("sda1"), "1");
        assert_eq!(sysnum("nvme0n1p12"), "12");
        assert_eq!(sysnum("sda"), "");
    }

    #[test]
    fn test_enumerate_block_devices() {
        let (_dir, paths) = fixture();
        let devices = enumerate_subsystem(&paths, "block").unwrap();
        assert_eq!(devices.len(), 2);

        let disk = devices.iter().find(|d| d.sysname == "sda").unwrap();
        assert_eq!(disk.subsystem, "block");
        assert_eq!(disk.devtype, "disk");
        assert_eq!(disk.devnode, "/dev/sda");
        assert_eq!(disk.parent_sysname, "0:0:0:0");
        assert!(disk.devpath.starts_with("/devices/pci0000:00/"));
        assert_eq!(disk.property("ID_WWN"), "0x5000c500a1b2c3d4");
        assert_eq!(disk.property("DEVNAME"), "/dev/sda");
        assert!(disk.tags.contains_key("systemd"));
        assert_eq!(disk.attributes["size"], "1953525168");
        assert!(!disk.attributes.contains_key("uevent"));

        let part = devices.iter().find(|d| d.sysname == "sda1").unwrap();
        assert_eq!(part.devtype, "partition");
        assert_eq!(part.sysnum, "1");
        assert_eq!(part.parent_sysname, "sda");
        assert_eq!(part.property("ID_WWN"), "");
    }

    #[test]
    fn test_unknown_subsystem_is_empty() {
        let (_dir, paths) = fixture();
        assert!(enumerate_subsystem(&paths, "net").unwrap().is_empty());
    }
}
