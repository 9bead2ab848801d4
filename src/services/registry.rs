use crate::errors::BridgeError;
use crate::utils::fs_atomic::atomic_write_text_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,
}

/// Read-only view of the host table handed to the resolver for one
/// invocation. Later registry writes never show up in an existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    table: HostTable,
}

impl RegistrySnapshot {
    pub fn default_identifier(&self) -> Option<&str> {
        self.table
            .default
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn entry(&self, identifier: &str) -> Option<&HostEntry> {
        self.table.hosts.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.table.hosts.contains_key(identifier)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &HostEntry)> {
        self.table.hosts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.table.hosts.is_empty()
    }
}

impl From<HostTable> for RegistrySnapshot {
    fn from(table: HostTable) -> Self {
        Self { table }
    }
}

pub struct HostRegistry {
    file_path: PathBuf,
    table: RwLock<HostTable>,
}

impl HostRegistry {
    /// Loads the registry at `file_path`; a missing file is an empty registry.
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let file_path = file_path.into();
        let table = Self::load(&file_path)?;
        Ok(Self {
            file_path,
            table: RwLock::new(table),
        })
    }

    fn load(path: &Path) -> Result<HostTable, BridgeError> {
        if !path.exists() {
            return Ok(HostTable::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BridgeError::internal(format!(
                "Failed to load host registry {}: {}",
                path.display(),
                err
            ))
        })?;
        if raw.trim().is_empty() {
            return Ok(HostTable::default());
        }
        serde_json::from_str(&raw).map_err(|err| {
            BridgeError::invalid_params(format!(
                "Failed to parse host registry {}: {}",
                path.display(),
                err
            ))
            .with_hint("Expected { \"default\": \"pi1\", \"hosts\": { \"pi1\": { \"host\": \"...\" } } }")
        })
    }

    fn persist(&self, table: &HostTable) -> Result<(), BridgeError> {
        let data = serde_json::to_string_pretty(table).map_err(|err| {
            BridgeError::internal(format!("Failed to serialize host registry: {}", err))
        })?;
        atomic_write_text_file(&self.file_path, &format!("{}\n", data), 0o600).map_err(|err| {
            BridgeError::internal(format!(
                "Failed to save host registry {}: {}",
                self.file_path.display(),
                err
            ))
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HostTable> {
        self.table.read().unwrap_or_else(|err| err.into_inner())
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut HostTable) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let mut guard = self.table.write().unwrap_or_else(|err| err.into_inner());
        let mut next = guard.clone();
        let out = apply(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::from(self.read().clone())
    }

    pub fn get(&self, name: &str) -> Result<HostEntry, BridgeError> {
        self.read()
            .hosts
            .get(name)
            .cloned()
            .ok_or_else(|| unknown_host(name))
    }

    /// Inserts or replaces `name`. Returns `true` when an entry was replaced.
    pub fn upsert(&self, name: &str, entry: HostEntry) -> Result<bool, BridgeError> {
        self.update(|table| Ok(table.hosts.insert(name.to_string(), entry).is_some()))
    }

    pub fn remove(&self, name: &str) -> Result<HostEntry, BridgeError> {
        self.update(|table| {
            let removed = table.hosts.remove(name).ok_or_else(|| unknown_host(name))?;
            if table.default.as_deref() == Some(name) {
                table.default = None;
            }
            Ok(removed)
        })
    }

    pub fn set_default(&self, name: &str) -> Result<(), BridgeError> {
        self.update(|table| {
            if !table.hosts.contains_key(name) {
                return Err(unknown_host(name));
            }
            table.default = Some(name.to_string());
            Ok(())
        })
    }

    pub fn set_default_path(&self, name: &str, path: &str) -> Result<(), BridgeError> {
        self.update(|table| {
            let entry = table.hosts.get_mut(name).ok_or_else(|| unknown_host(name))?;
            entry.default_path = Some(path.to_string());
            Ok(())
        })
    }
}

fn unknown_host(name: &str) -> BridgeError {
    BridgeError::not_found(format!("Host '{}' not found in registry", name))
        .with_hint("Use `hostbridge list` to see configured hosts.")
}
