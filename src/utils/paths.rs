use crate::constants::{defaults, env as env_keys};
use crate::utils::user_paths::{expand_home_path, home_dir};
use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(expand_home_path(trimmed))
}

fn resolve_xdg_config_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_CONFIG_HOME").ok()) {
        return Some(path);
    }
    home_dir().map(|home| home.join(".config"))
}

fn resolve_entry_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
}

/// Registry location: explicit path, then `HOSTBRIDGE_CONFIG`, then the XDG
/// config dir, then `hosts.json` one level above the executable.
pub fn resolve_registry_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_home_path(path);
    }
    if let Some(path) = normalize_env_path(env::var(env_keys::CONFIG_PATH).ok()) {
        return path;
    }
    if let Some(dir) = resolve_xdg_config_dir() {
        return dir.join(defaults::BINARY_NAME).join("hosts.json");
    }
    resolve_entry_dir()
        .map(|dir| dir.join("..").join("hosts.json"))
        .unwrap_or_else(|| PathBuf::from("hosts.json"))
}

pub fn resolve_known_hosts_path() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var(env_keys::KNOWN_HOSTS_PATH).ok()) {
        return Some(path);
    }
    home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}
