//! Live device events from the udev netlink group
//!
//! udevd re-broadcasts every processed uevent on the `NETLINK_KOBJECT_UEVENT`
//! multicast group 2, after its rules ran, so messages already carry the
//! ID_* properties. Each message is a fixed header followed by
//! NUL-separated `KEY=VALUE` properties:
//!
//! ```text
//! "libudev\0" | magic (BE 0xfeedcafe) | header_size | properties_off |
//! properties_len | filter hashes ...
//! ```

use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::db::parse_tag_list;
use crate::sysfs::{devnode_path, path_sysname, read_device, sysnum};
use crate::UdevPaths;
use ht_core::{Device, DeviceAction, DeviceEvent, DeviceMonitor};
use ht_error::{HwTaggerError, Result};

/// Multicast group of udev-processed events (1 is raw kernel events)
const UDEV_MONITOR_GROUP: u32 = 2;

const UDEV_MAGIC: u32 = 0xfeed_cafe;

const HEADER_PREFIX: &[u8] = b"libudev\0";

/// Offset of properties_off / properties_len in the header
const PROPERTIES_OFF_AT: usize = 16;
const PROPERTIES_LEN_AT: usize = 20;

/// Receive buffer requested from the kernel, udev bursts can be large
const RECV_BUFFER_BYTES: libc::c_int = 4 * 1024 * 1024;

/// Largest single message accepted
const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Blocking netlink subscription filtered to one subsystem
pub struct NetlinkMonitor {
    fd: OwnedFd,
    subsystem: String,
    paths: UdevPaths,
    buf: Vec<u8>,
}

impl NetlinkMonitor {
    pub fn open(subsystem: &str, paths: UdevPaths) -> Result<Self> {
        // SAFETY: plain socket(2) call; the returned descriptor is checked
        // before being wrapped in an OwnedFd.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(HwTaggerError::monitor_socket(subsystem, io::Error::last_os_error()));
        }
        // SAFETY: raw is a freshly created, valid descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_groups = UDEV_MONITOR_GROUP;

        // SAFETY: addr is a properly initialized sockaddr_nl and the length matches its size.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(HwTaggerError::monitor_socket(subsystem, io::Error::last_os_error()));
        }

        set_receive_buffer(&fd);
        debug!("Listening for {} events on udev netlink group", subsystem);

        Ok(Self {
            fd,
            subsystem: subsystem.to_string(),
            paths,
            buf: vec![0u8; MAX_MESSAGE_SIZE],
        })
    }

    fn recv(&mut self) -> io::Result<usize> {
        loop {
            // SAFETY: buf is a valid writable buffer of buf.len() bytes for the whole call.
            let n = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    self.buf.as_mut_ptr() as *mut libc::c_void,
                    self.buf.len(),
                    0,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl DeviceMonitor for NetlinkMonitor {
    fn receive(&mut self) -> Result<DeviceEvent> {
        loop {
            // ENOBUFS means events were dropped, which is as fatal as a closed socket
            let len = self
                .recv()
                .map_err(|e| HwTaggerError::monitor_receive(&self.subsystem, e))?;

            let Some(properties) = parse_message(&self.buf[..len]) else {
                debug!("Ignoring malformed udev message ({} bytes)", len);
                continue;
            };
            if properties.get("SUBSYSTEM").map(String::as_str) != Some(self.subsystem.as_str()) {
                trace!("Ignoring event for another subsystem");
                continue;
            }
            return Ok(event_from_properties(&self.paths, properties));
        }
    }
}

fn set_receive_buffer(fd: &OwnedFd) {
    let size = RECV_BUFFER_BYTES;
    // SAFETY: size is a valid c_int living for the duration of the call.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!("Failed to enlarge netlink receive buffer: {}", io::Error::last_os_error());
    }
}

/// Parse a udev netlink message into its properties
pub fn parse_message(buf: &[u8]) -> Option<BTreeMap<String, String>> {
    if buf.len() < PROPERTIES_LEN_AT + 4 || !buf.starts_with(HEADER_PREFIX) {
        return None;
    }
    if read_u32_be(buf, 8)? != UDEV_MAGIC {
        return None;
    }
    let offset = read_u32_ne(buf, PROPERTIES_OFF_AT)? as usize;
    let length = read_u32_ne(buf, PROPERTIES_LEN_AT)? as usize;
    let end = offset.checked_add(length)?;
    let payload = buf.get(offset..end)?;

    let properties: BTreeMap<String, String> = payload
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();

    if properties.contains_key("ACTION") && properties.contains_key("DEVPATH") {
        Some(properties)
    } else {
        None
    }
}

/// Build an event from message properties
///
/// Devices still present are re-read from sysfs for their attributes and
/// parent; removed devices keep what the message carried.
pub fn event_from_properties(paths: &UdevPaths, properties: BTreeMap<String, String>) -> DeviceEvent {
    let action = DeviceAction::parse(properties.get("ACTION").map(String::as_str).unwrap_or(""));
    let devpath = properties.get("DEVPATH").cloned().unwrap_or_default();
    let syspath = paths.sys_root.join(devpath.trim_start_matches('/'));
    let subsystem = properties.get("SUBSYSTEM").cloned().unwrap_or_default();

    let mut device = if action != DeviceAction::Remove && syspath.join("uevent").is_file() {
        read_device(paths, &paths.sys_root, &syspath, &subsystem).unwrap_or_default()
    } else {
        Device::default()
    };

    // the message is authoritative for properties
    let sysname = path_sysname(Path::new(&devpath));
    if device.syspath.is_empty() {
        device.syspath = syspath.display().to_string();
        device.parent_sysname = message_parent_sysname(&devpath, &subsystem);
    }
    device.sysnum = sysnum(&sysname);
    device.sysname = sysname;
    device.devpath = devpath;
    device.subsystem = subsystem;
    device.devtype = properties.get("DEVTYPE").cloned().unwrap_or_default();
    device.devnode = properties
        .get("DEVNAME")
        .map(|name| devnode_path(paths, name))
        .unwrap_or_default();
    if let Some(driver) = properties.get("DRIVER") {
        device.driver = driver.clone();
    }
    if let Some(tags) = properties.get("TAGS").or_else(|| properties.get("CURRENT_TAGS")) {
        device.tags = parse_tag_list(tags);
    }
    device.properties = properties;

    DeviceEvent::new(action, device)
}

/// Parent sysname from a devpath alone, skipping the class directory
/// ("/block/", "/net/") devices are grouped under
fn message_parent_sysname(devpath: &str, subsystem: &str) -> String {
    let mut parent = Path::new(devpath).parent();
    if let Some(dir) = parent {
        if dir.file_name().map(|n| n == subsystem).unwrap_or(false) {
            parent = dir.parent();
        }
    }
    parent
        .filter(|dir| *dir != Path::new("/devices") && *dir != Path::new("/"))
        .map(path_sysname)
        .unwrap_or_default()
}

fn read_u32_be(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn read_u32_ne(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_ne_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEADER_SIZE: u32 = 40;

    fn message(props: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        for p in props {
            payload.extend_from_slice(p.as_bytes());
            payload.push(0);
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(HEADER_PREFIX);
        buf.extend_from_slice(&UDEV_MAGIC.to_be_bytes());
        buf.extend_from_slice(&HEADER_SIZE.to_ne_bytes());
        buf.extend_from_slice(&HEADER_SIZE.to_ne_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
        buf.resize(HEADER_SIZE as usize, 0);
        buf.extend_from_slice(&payload);
        buf
    }

    fn paths() -> UdevPaths {
        UdevPaths {
            sys_root: PathBuf::from("/nonexistent/sys"),
            udev_data: PathBuf::from("/nonexistent/run/udev/data"),
            dev_root: PathBuf::from("/dev"),
        }
    }

    #[test]
    fn test_parse_message() {
        let buf = message(&[
            "ACTION=add",
            "DEVPATH=/devices/virtual/block/loop0",
            "SUBSYSTEM=block",
            "DEVTYPE=disk",
        ]);
        let props = parse_message(&buf).unwrap();
        assert_eq!(props["ACTION"], "add");
        assert_eq!(props["DEVTYPE"], "disk");
    }

    #[test]
    fn test_rejects_kernel_and_truncated_messages() {
        let kernel = b"add@/devices/virtual/block/loop0\0ACTION=add\0";
        assert!(parse_message(kernel).is_none());

        let mut buf = message(&["ACTION=add", "DEVPATH=/devices/x"]);
        buf.truncate(buf.len() - 5);
        assert!(parse_message(&buf).is_none());

        let mut bad_magic = message(&["ACTION=add", "DEVPATH=/devices/x"]);
        bad_magic[8] = 0;
        assert!(parse_message(&bad_magic).is_none());
    }

    #[test]
    fn test_remove_event_from_properties() {
        let buf = message(&[
            "ACTION=remove",
            "DEVPATH=/devices/pci0000:00/0000:00:17.0/ata2/host1/target1:0:0/1:0:0:0/block/sdb",
            "SUBSYSTEM=block",
            "DEVTYPE=disk",
            "DEVNAME=/dev/sdb",
            "ID_WWN=0x5000c500deadbeef",
            "TAGS=:systemd:",
        ]);
        let event = event_from_properties(&paths(), parse_message(&buf).unwrap());
        assert_eq!(event.action, DeviceAction::Remove);

        let device = event.device.unwrap();
        assert_eq!(device.sysname, "sdb");
        assert_eq!(device.parent_sysname, "1:0:0:0");
        assert_eq!(device.devnode, "/dev/sdb");
        assert_eq!(device.devtype, "disk");
        assert_eq!(device.property("ID_WWN"), "0x5000c500deadbeef");
        assert!(device.tags.contains_key("systemd"));
        assert!(device.syspath.ends_with("/block/sdb"));
    }
}
