//! Application inventory: the external catalog that supplies application records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// An installed application as described by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub app_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_uninstall_command: Option<String>,
}

impl ApplicationRecord {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            version: None,
            uninstall_command: None,
            quiet_uninstall_command: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_uninstall_command(mut self, command: impl Into<String>) -> Self {
        self.uninstall_command = Some(command.into());
        self
    }

    pub fn with_quiet_uninstall_command(mut self, command: impl Into<String>) -> Self {
        self.quiet_uninstall_command = Some(command.into());
        self
    }

    /// Uninstall commands in preference order (quiet first).
    pub fn uninstall_commands(&self) -> impl Iterator<Item = &str> {
        self.quiet_uninstall_command
            .as_deref()
            .into_iter()
            .chain(self.uninstall_command.as_deref())
    }
}

/// Source of application records.
pub trait InventoryProvider {
    fn application(&self, app_id: &str) -> anyhow::Result<Option<ApplicationRecord>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryEntry {
    #[serde(default)]
    app_id: Option<String>,
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    uninstall_command: Option<String>,
    #[serde(default)]
    quiet_uninstall_command: Option<String>,
}

/// Inventory backed by a JSON document keyed by application id.
#[derive(Debug, Clone, Default)]
pub struct JsonInventory {
    records: BTreeMap<String, ApplicationRecord>,
}

impl JsonInventory {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse inventory: {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let entries: BTreeMap<String, InventoryEntry> =
            serde_json::from_str(content).context("Inventory must be a JSON object keyed by app id")?;
        let records = entries
            .into_iter()
            .map(|(key, entry)| {
                let record = ApplicationRecord {
                    app_id: entry.app_id.unwrap_or_else(|| key.clone()),
                    name: entry.name,
                    version: entry.version,
                    uninstall_command: entry.uninstall_command,
                    quiet_uninstall_command: entry.quiet_uninstall_command,
                };
                (key, record)
            })
            .collect();
        Ok(Self { records })
    }

    pub fn from_records(records: impl IntoIterator<Item = ApplicationRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.app_id.clone(), record))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl InventoryProvider for JsonInventory {
    fn application(&self, app_id: &str) -> anyhow::Result<Option<ApplicationRecord>> {
        if let Some(record) = self.records.get(app_id) {
            return Ok(Some(record.clone()));
        }
        let found = self
            .records
            .iter()
            .find(|(key, record)| {
                key.eq_ignore_ascii_case(app_id) || record.app_id.eq_ignore_ascii_case(app_id)
            })
            .map(|(_, record)| record.clone());
        Ok(found)
    }
}

/// Default location of the bundled catalog.
pub fn default_inventory_path() -> anyhow::Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .or_else(dirs::data_local_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(data_dir.join("residue").join("catalog").join("inventory.json"))
}
