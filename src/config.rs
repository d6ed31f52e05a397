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

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ht_core::constants::defaults;
use ht_core::{is_label_char, DeviceFilter, IdentifierTag, WatchScope};
use ht_error::{HwTaggerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    pub prefix: String,
    pub subsystem: String,
    #[serde(default)]
    pub filter: DeviceFilter,
    pub identifiers: Vec<IdentifierTag>,
}

impl ScopeConfig {
    pub fn into_scope(self) -> WatchScope {
        WatchScope::new(
            self.prefix,
            self.subsystem,
            self.filter.into_predicate(),
            self.identifiers,
        )
    }
}

impl Default for ScopeConfig {
    /// Whole disks of the block subsystem, tagged by WWN and short serial
    fn default() -> Self {
        Self {
            prefix: defaults::LABEL_PREFIX.to_string(),
            subsystem: defaults::SUBSYSTEM.to_string(),
            filter: DeviceFilter::devtype(defaults::DEVTYPE),
            identifiers: defaults::IDENTIFIERS
                .iter()
                .map(|(tag, property)| IdentifierTag::new(*tag, *property))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedConfig {
    pub scopes: Vec<ScopeConfig>,
}

impl Default for SavedConfig {
    fn default() -> Self {
        Self {
            scopes: vec![ScopeConfig::default()],
        }
    }
}

impl SavedConfig {
    pub fn into_scopes(self) -> Vec<WatchScope> {
        self.scopes.into_iter().map(ScopeConfig::into_scope).collect()
    }
}

/// Load and validate a config file, or the built-in default without one
pub fn load_config(path: Option<&Path>) -> Result<SavedConfig> {
    let Some(path) = path else {
        return Ok(SavedConfig::default());
    };
    let data = fs::read_to_string(path).map_err(|source| HwTaggerError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SavedConfig = serde_json::from_str(&data)?;
    validate_config(&config)?;
    Ok(config)
}

fn is_safe_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_label_char)
}

pub fn validate_config(config: &SavedConfig) -> Result<()> {
    if config.scopes.is_empty() {
        return Err(HwTaggerError::invalid_config("scopes", "at least one scope is required"));
    }

    for (i, scope) in config.scopes.iter().enumerate() {
        let field = |name: &str| format!("scopes[{}].{}", i, name);

        if scope.prefix.is_empty() {
            return Err(HwTaggerError::invalid_config(field("prefix"), "must not be empty"));
        }
        if scope.prefix.contains('/') {
            return Err(HwTaggerError::invalid_config(field("prefix"), "must not contain '/'"));
        }
        if !is_safe_segment(&scope.subsystem) {
            return Err(HwTaggerError::invalid_config(
                field("subsystem"),
                format!("invalid subsystem {:?}", scope.subsystem),
            ));
        }
        if scope.identifiers.is_empty() {
            return Err(HwTaggerError::invalid_config(
                field("identifiers"),
                "at least one identifier is required",
            ));
        }
        for ident in &scope.identifiers {
            if !is_safe_segment(&ident.tag) {
                return Err(HwTaggerError::invalid_config(
                    field("identifiers"),
                    format!("invalid tag {:?}", ident.tag),
                ));
            }
            if ident.property.is_empty() {
                return Err(HwTaggerError::invalid_config(
                    field("identifiers"),
                    format!("tag {:?} has no property", ident.tag),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_core::Device;
    use tempfile::TempDir;

    #[test]
    fn test_default_scope() {
        let config = SavedConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.scopes.len(), 1);

        let scope = config.into_scopes().remove(0);
        assert_eq!(scope.key_prefix(), "node-devices.alpha.kubernetes.io/block-");
        assert_eq!(scope.identifiers[0], IdentifierTag::new("wwn", "ID_WWN"));
        assert_eq!(scope.identifiers[1], IdentifierTag::new("sn", "ID_SERIAL_SHORT"));

        let disk = Device {
            devtype: "disk".into(),
            ..Default::default()
        };
        let part = Device {
            devtype: "partition".into(),
            ..Default::default()
        };
        assert!(scope.accepts(&disk));
        assert!(!scope.accepts(&part));
    }

    #[test]
    fn test_load_without_file_is_default() {
        assert_eq!(load_config(None).unwrap(), SavedConfig::default());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hw-tagger.json");
        fs::write(
            &path,
            r#"{
                "scopes": [{
                    "prefix": "example.com",
                    "subsystem": "net",
                    "filter": {"require_properties": ["ID_NET_NAME_MAC"]},
                    "identifiers": [{"tag": "mac", "property": "ID_NET_NAME_MAC"}]
                }]
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.scopes[0].subsystem, "net");
        assert_eq!(config.scopes[0].filter.require_properties, vec!["ID_NET_NAME_MAC"]);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hw-tagger.json");
        fs::write(&path, r#"{"scopes": [], "debounce": 5}"#).unwrap();
        assert!(matches!(load_config(Some(&path)), Err(HwTaggerError::JsonParse(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = SavedConfig::default();
        config.scopes[0].prefix = "example.com/x".into();
        assert!(matches!(
            validate_config(&config),
            Err(HwTaggerError::InvalidConfig { .. })
        ));

        let mut config = SavedConfig::default();
        config.scopes[0].identifiers.clear();
        assert!(validate_config(&config).is_err());

        let mut config = SavedConfig::default();
        config.scopes[0].identifiers[0].tag = "w w n".into();
        assert!(validate_config(&config).is_err());

        assert!(validate_config(&SavedConfig { scopes: vec![] }).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/hw-tagger.json"))).unwrap_err();
        assert!(matches!(err, HwTaggerError::FileRead { .. }));
    }
}
