//! udev database records
//!
//! udevd stores what it learned about each device in `/run/udev/data/<id>`:
//! `E:KEY=VALUE` properties, `S:` devlinks, `G:`/`Q:` tags and a few
//! bookkeeping lines that are ignored here.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::trace;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DbRecord {
    pub properties: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

/// Database file name for a device
///
/// `b<maj>:<min>` for block devnodes, `c<maj>:<min>` for other devnodes,
/// `n<ifindex>` for network interfaces and `+<subsystem>:<sysname>` for
/// everything else.
pub fn record_id(subsystem: &str, sysname: &str, properties: &BTreeMap<String, String>) -> String {
    let major = properties.get("MAJOR").and_then(|m| m.parse::<u32>().ok());
    let minor = properties.get("MINOR").and_then(|m| m.parse::<u32>().ok());
    if let (Some(major), Some(minor)) = (major, minor) {
        if major > 0 {
            let kind = if subsystem == "block" { 'b' } else { 'c' };
            return format!("{}{}:{}", kind, major, minor);
        }
    }
    if let Some(ifindex) = properties.get("IFINDEX").filter(|i| !i.is_empty()) {
        return format!("n{}", ifindex);
    }
    format!("+{}:{}", subsystem, sysname.replace('/', "!"))
}

/// Read and parse a record, `None` when udev has no data for the device
pub fn read_record(data_dir: &Path, id: &str) -> Option<DbRecord> {
    let path = data_dir.join(id);
    match fs::read_to_string(&path) {
        Ok(content) => Some(parse_record(&content)),
        Err(e) => {
            trace!("No udev record {:?}: {}", path, e);
            None
        }
    }
}

pub fn parse_record(content: &str) -> DbRecord {
    let mut record = DbRecord::default();
    let mut devlinks = Vec::new();

    for line in content.lines() {
        let Some((kind, value)) = line.split_once(':') else {
            continue;
        };
        match kind {
            "E" => {
                if let Some((k, v)) = value.split_once('=') {
                    record.properties.insert(k.to_string(), v.to_string());
                }
            }
            "S" => devlinks.push(format!("/dev/{}", value)),
            "G" | "Q" => {
                record.tags.insert(value.to_string(), String::new());
            }
            _ => {}
        }
    }

    if !devlinks.is_empty() {
        record
            .properties
            .insert("DEVLINKS".to_string(), devlinks.join(" "));
    }
    record
}

/// Tags from a `:tag1:tag2:` property value
pub fn parse_tag_list(value: &str) -> BTreeMap<String, String> {
    value
        .split(':')
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), String::new()))
        .collect()
}
