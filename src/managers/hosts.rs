use crate::channel::{Authenticator, ConnectionProfile};
use crate::constants::{defaults, network};
use crate::errors::{BridgeError, BridgeErrorKind};
use crate::services::logger::Logger;
use crate::services::prompt::{Prompt, PromptReply};
use crate::services::registry::{HostEntry, HostRegistry, RegistrySnapshot};
use crate::services::trust::{
    MismatchEvent, PromptPolicy, RejectPolicy, TrustDecision, TrustPolicy, TrustResolver,
};
use crate::services::validation::Validation;
use crate::utils::invocation::{create_alias, remove_alias, AliasOutcome};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where alias symlinks for host names are created.
#[derive(Debug, Clone)]
pub struct AliasTarget {
    pub dir: PathBuf,
    pub executable: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub replaced: bool,
    pub stored_password: bool,
    pub alias: Option<AliasOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostListing {
    pub name: String,
    pub host: String,
    pub user: String,
    pub is_default: bool,
    pub default_path: Option<String>,
}

/// Registry bookkeeping behind the `add`/`remove`/`list`/`set-*` commands.
pub struct HostsManager {
    logger: Logger,
    validation: Validation,
    registry: Arc<HostRegistry>,
    alias: Option<AliasTarget>,
}

impl HostsManager {
    pub fn new(
        logger: &Logger,
        validation: Validation,
        registry: Arc<HostRegistry>,
        alias: Option<AliasTarget>,
    ) -> Self {
        Self {
            logger: logger.child("hosts"),
            validation,
            registry,
            alias,
        }
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn add(
        &self,
        name: &str,
        host: &str,
        user: &str,
        password: Option<&str>,
        key: Option<&str>,
    ) -> Result<AddOutcome, BridgeError> {
        let name = self.validation.ensure_identifier(name, "name")?;
        let host = self.validation.ensure_string(host, "host")?;
        let user = self.validation.ensure_string(user, "user")?;
        let password = password.filter(|p| !p.is_empty()).map(str::to_string);
        let key = self.validation.ensure_optional_string(key, "key")?;

        // Re-adding a host keeps its configured default path.
        let default_path = self
            .registry
            .snapshot()
            .entry(&name)
            .and_then(|entry| entry.default_path.clone());
        let stored_password = password.is_some();
        let replaced = self.registry.upsert(
            &name,
            HostEntry {
                host,
                user: Some(user),
                password,
                key,
                default_path,
            },
        )?;

        let alias = self.alias.as_ref().map(|target| {
            create_alias(&target.dir, &name, &target.executable).unwrap_or_else(|err| {
                self.logger.warn(
                    "Could not create alias symlink",
                    Some(&serde_json::json!({"name": name, "error": err.to_string()})),
                );
                AliasOutcome::Unsupported
            })
        });
        Ok(AddOutcome {
            replaced,
            stored_password,
            alias,
        })
    }

    pub fn remove(&self, name: &str) -> Result<Option<AliasOutcome>, BridgeError> {
        let name = self.validation.ensure_string(name, "name")?;
        self.registry.remove(&name)?;
        let Some(target) = self.alias.as_ref() else {
            return Ok(None);
        };
        match remove_alias(&target.dir, &name) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) => {
                self.logger.warn(
                    "Could not remove alias symlink",
                    Some(&serde_json::json!({"name": name, "error": err.to_string()})),
                );
                Ok(None)
            }
        }
    }

    pub fn list(&self) -> Vec<HostListing> {
        let snapshot = self.registry.snapshot();
        let default = snapshot.default_identifier().map(str::to_string);
        snapshot
            .entries()
            .map(|(name, entry)| HostListing {
                name: name.clone(),
                host: entry.host.clone(),
                user: entry.user.clone().unwrap_or_else(|| defaults::USER.to_string()),
                is_default: default.as_deref() == Some(name.as_str()),
                default_path: entry.default_path.clone(),
            })
            .collect()
    }

    pub fn set_default(&self, name: &str) -> Result<(), BridgeError> {
        let name = self.validation.ensure_string(name, "name")?;
        self.registry.set_default(&name)
    }

    pub fn set_path(&self, name: &str, path: &str) -> Result<(), BridgeError> {
        let name = self.validation.ensure_string(name, "name")?;
        let path = self.validation.ensure_absolute_remote_path(path, "path")?;
        self.registry.set_default_path(&name, &path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Online,
    Offline,
    NoHost,
    BadKey,
}

impl HostStatus {
    pub fn label(self) -> &'static str {
        match self {
            HostStatus::Online => "ONLINE",
            HostStatus::Offline => "OFFLINE",
            HostStatus::NoHost => "OFFLINE (No host)",
            HostStatus::BadKey => "BAD KEY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: String,
    pub host: Option<String>,
    pub hostname: Option<String>,
    pub status: HostStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Ok,
    OkUnverified,
    KeyUpdated,
    KeyUpdateFailed,
    BadKeyUnchanged,
    Offline,
    NoHost,
    Error(String),
}

impl KeyCheck {
    pub fn label(&self) -> String {
        match self {
            KeyCheck::Ok => "OK".to_string(),
            KeyCheck::OkUnverified => "OK (UNVERIFIED)".to_string(),
            KeyCheck::KeyUpdated => "KEY UPDATED".to_string(),
            KeyCheck::KeyUpdateFailed => "KEY UPDATE FAILED".to_string(),
            KeyCheck::BadKeyUnchanged => "BAD KEY (UNCHANGED)".to_string(),
            KeyCheck::Offline => "OFFLINE".to_string(),
            KeyCheck::NoHost => "OFFLINE (No host)".to_string(),
            KeyCheck::Error(cause) => format!("ERROR: {}", cause),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheckRow {
    pub name: String,
    pub host: Option<String>,
    pub result: KeyCheck,
}

/// Remembers the last decision of the wrapped policy.
struct RecordingPolicy<'a> {
    inner: &'a dyn TrustPolicy,
    last: Mutex<Option<TrustDecision>>,
}

impl TrustPolicy for RecordingPolicy<'_> {
    fn decide(&self, event: &MismatchEvent) -> TrustDecision {
        let decision = self.inner.decide(event);
        *self.last.lock().unwrap_or_else(|err| err.into_inner()) = Some(decision);
        decision
    }
}

/// Connectivity and host-key checks across registered hosts.
pub struct HostProbe {
    logger: Logger,
    trust: TrustResolver,
    prompt: Arc<dyn Prompt>,
    interactive: bool,
    timeout_ms: u64,
}

impl HostProbe {
    pub fn new(
        logger: &Logger,
        trust: TrustResolver,
        prompt: Arc<dyn Prompt>,
        interactive: bool,
    ) -> Self {
        Self {
            logger: logger.child("probe"),
            trust,
            prompt,
            interactive,
            timeout_ms: network::TIMEOUT_STATUS_PROBE_MS,
        }
    }

    fn stored_profile(&self, name: &str, entry: &HostEntry) -> Option<ConnectionProfile> {
        let host = entry.host.trim();
        if host.is_empty() {
            return None;
        }
        let authenticator = match (entry.key.as_deref(), entry.password.as_deref()) {
            (Some(key), _) if !key.trim().is_empty() => Authenticator::KeyFile(PathBuf::from(key)),
            (_, Some(password)) if !password.is_empty() => {
                Authenticator::Password(password.to_string())
            }
            _ => Authenticator::None,
        };
        Some(ConnectionProfile {
            host: host.to_string(),
            user: entry
                .user
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults::USER)
                .to_string(),
            authenticator,
            identifier: Some(name.to_string()),
            port: network::SSH_DEFAULT_PORT,
            connect_timeout_ms: self.timeout_ms,
        })
    }

    fn targets<'a>(
        snapshot: &'a RegistrySnapshot,
        name: Option<&str>,
    ) -> Result<Vec<(&'a String, &'a HostEntry)>, BridgeError> {
        match name {
            Some(name) => snapshot
                .entries()
                .find(|(id, _)| id.as_str() == name)
                .map(|pair| vec![pair])
                .ok_or_else(|| {
                    BridgeError::not_found(format!("Host '{}' not found in registry", name))
                }),
            None => Ok(snapshot.entries().collect()),
        }
    }

    /// Probes each host (or only `name`). Hostname lookups are best effort.
    pub fn status(
        &self,
        snapshot: &RegistrySnapshot,
        name: Option<&str>,
    ) -> Result<Vec<StatusRow>, BridgeError> {
        let mut rows = Vec::new();
        for (id, entry) in Self::targets(snapshot, name)? {
            let Some(mut profile) = self.stored_profile(id, entry) else {
                rows.push(StatusRow {
                    name: id.clone(),
                    host: None,
                    hostname: None,
                    status: HostStatus::NoHost,
                });
                continue;
            };
            if profile.authenticator.is_none() && self.interactive {
                let label = format!(
                    "Enter password for {} (optional, for status check)",
                    profile.label()
                );
                if let PromptReply::Value(secret) = self.prompt.secret(&label) {
                    if !secret.is_empty() {
                        profile.authenticator = Authenticator::Password(secret);
                    }
                }
            }

            let (status, hostname) = match self.trust.open(&profile, &RejectPolicy) {
                Ok(mut report) => {
                    let hostname = report
                        .session
                        .run("hostname")
                        .ok()
                        .map(|out| out.stdout.trim().to_string())
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| defaults::UNKNOWN_HOSTNAME.to_string());
                    report.session.close();
                    (HostStatus::Online, Some(hostname))
                }
                Err(err) if err.kind == BridgeErrorKind::IdentityMismatch => {
                    (HostStatus::BadKey, None)
                }
                Err(err) => {
                    self.logger.debug(
                        "Host unreachable",
                        Some(&serde_json::json!({"host": profile.host, "error": err.message})),
                    );
                    (HostStatus::Offline, None)
                }
            };
            rows.push(StatusRow {
                name: id.clone(),
                host: Some(profile.host),
                hostname,
                status,
            });
        }
        Ok(rows)
    }

    /// Connects to every host with stored credentials and reconciles changed
    /// host keys through the trust policy.
    pub fn check_keys(&self, snapshot: &RegistrySnapshot) -> Vec<KeyCheckRow> {
        let prompt_policy = PromptPolicy::new(self.prompt.clone());
        let base: &dyn TrustPolicy = if self.interactive {
            &prompt_policy
        } else {
            &RejectPolicy
        };

        let mut rows = Vec::new();
        for (id, entry) in snapshot.entries() {
            let Some(profile) = self.stored_profile(id, entry) else {
                rows.push(KeyCheckRow {
                    name: id.clone(),
                    host: None,
                    result: KeyCheck::NoHost,
                });
                continue;
            };
            let policy = RecordingPolicy {
                inner: base,
                last: Mutex::new(None),
            };
            let result = match self.trust.open(&profile, &policy) {
                Ok(mut report) => {
                    report.session.close();
                    if report.remediated {
                        KeyCheck::KeyUpdated
                    } else if report.untrusted {
                        KeyCheck::OkUnverified
                    } else {
                        KeyCheck::Ok
                    }
                }
                Err(err) => match err.kind {
                    BridgeErrorKind::IdentityMismatch => {
                        let last = *policy.last.lock().unwrap_or_else(|e| e.into_inner());
                        if last == Some(TrustDecision::RemediateAndRetry) {
                            KeyCheck::KeyUpdateFailed
                        } else {
                            KeyCheck::BadKeyUnchanged
                        }
                    }
                    BridgeErrorKind::ConnectFailed => KeyCheck::Offline,
                    _ => KeyCheck::Error(err.message),
                },
            };
            rows.push(KeyCheckRow {
                name: id.clone(),
                host: Some(profile.host),
                result,
            });
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (HostsManager, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "hostbridge-hosts-{}-{}",
            std::process::id(),
            rand::random::<u32>()
        ));
        let registry = HostRegistry::open(dir.join("hosts.json")).unwrap();
        (
            HostsManager::new(
                &Logger::new("test"),
                Validation::new(),
                Arc::new(registry),
                None,
            ),
            dir,
        )
    }

    #[test]
    fn add_list_and_readd_keeps_default_path() {
        let (hosts, dir) = manager();
        let outcome = hosts.add("pi1", "10.0.0.2", "pi", Some("pw"), None).unwrap();
        assert!(!outcome.replaced);
        assert!(outcome.stored_password);
        assert_eq!(outcome.alias, None);

        hosts.set_default("pi1").unwrap();
        hosts.set_path("pi1", "/opt/app").unwrap();
        let outcome = hosts.add("pi1", "10.0.0.9", "admin", None, None).unwrap();
        assert!(outcome.replaced);

        let listing = hosts.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].host, "10.0.0.9");
        assert!(listing[0].is_default);
        assert_eq!(listing[0].default_path.as_deref(), Some("/opt/app"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn rejects_bad_names_and_relative_paths() {
        let (hosts, dir) = manager();
        assert_eq!(
            hosts.add("../pi", "10.0.0.2", "pi", None, None).unwrap_err().code(),
            "INVALID_PARAMS"
        );
        hosts.add("pi1", "10.0.0.2", "pi", None, None).unwrap();
        assert_eq!(
            hosts.set_path("pi1", "opt/app").unwrap_err().code(),
            "INVALID_PARAMS"
        );
        assert_eq!(hosts.set_path("ghost", "/opt").unwrap_err().code(), "NOT_FOUND");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn key_check_labels() {
        assert_eq!(KeyCheck::KeyUpdated.label(), "KEY UPDATED");
        assert_eq!(KeyCheck::Error("boom".to_string()).label(), "ERROR: boom");
        assert_eq!(HostStatus::NoHost.label(), "OFFLINE (No host)");
    }
}
