use crate::channel::{Authenticator, ConnectionProfile};
use crate::constants::{defaults, network};
use crate::errors::BridgeError;
use crate::services::logger::Logger;
use crate::services::prompt::{Prompt, PromptReply};
use crate::services::registry::{HostEntry, RegistrySnapshot};
use std::path::PathBuf;

/// Connection parameters given on the command line.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ExplicitArgs {
    pub identifier: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
}

impl std::fmt::Debug for ExplicitArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplicitArgs")
            .field("identifier", &self.identifier)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// False when prompting is disabled for this invocation.
    pub interactive: bool,
    /// Ask for a password when no authenticator resolved. `send` turns this
    /// off since elevation may bring its own secret.
    pub prompt_for_secret: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            interactive: true,
            prompt_for_secret: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub profile: ConnectionProfile,
    pub default_remote_dir: Option<String>,
}

impl ResolvedTarget {
    /// Identifier used for display; the host when no identifier resolved.
    pub fn display_name(&self) -> &str {
        self.profile
            .identifier
            .as_deref()
            .unwrap_or(self.profile.host.as_str())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Merges explicit arguments, the invocation hint, the stored host entry and
/// interactive prompts into one [`ConnectionProfile`].
pub struct ParameterResolver {
    logger: Logger,
    connect_timeout_ms: u64,
}

impl ParameterResolver {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.child("resolver"),
            connect_timeout_ms: network::TIMEOUT_CONNECT_MS,
        }
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Picks the target identifier: explicit > hint (only when it names a
    /// registered host) > registry default.
    pub fn resolve_identifier(
        &self,
        explicit: Option<&str>,
        hint: Option<&str>,
        snapshot: &RegistrySnapshot,
    ) -> Option<String> {
        if let Some(id) = non_empty(explicit) {
            return Some(id.to_string());
        }
        if let Some(hint) = non_empty(hint) {
            if snapshot.contains(hint) {
                return Some(hint.to_string());
            }
            self.logger.debug(
                "Ignoring identity hint with no registry entry",
                Some(&serde_json::json!({"hint": hint})),
            );
        }
        snapshot.default_identifier().map(str::to_string)
    }

    pub fn resolve(
        &self,
        explicit: &ExplicitArgs,
        hint: Option<&str>,
        snapshot: &RegistrySnapshot,
        prompt: &dyn Prompt,
        options: ResolveOptions,
    ) -> Result<ResolvedTarget, BridgeError> {
        let identifier = self
            .resolve_identifier(explicit.identifier.as_deref(), hint, snapshot)
            .ok_or_else(|| {
                BridgeError::no_identifier("No host specified and no default is set")
                    .with_hint("Pass --target <name> or run `hostbridge set-default <name>`.")
            })?;
        let stored = snapshot.entry(&identifier).cloned().unwrap_or_default();

        let host = non_empty(explicit.host.as_deref())
            .or_else(|| non_empty(Some(stored.host.as_str())))
            .map(str::to_string)
            .ok_or_else(|| {
                BridgeError::no_host(format!("No host configured for '{}'", identifier))
                    .with_hint(format!(
                        "Pass --host or run `hostbridge add {} --host <address>`.",
                        identifier
                    ))
            })?;
        let user = non_empty(explicit.user.as_deref())
            .or_else(|| non_empty(stored.user.as_deref()))
            .unwrap_or(defaults::USER)
            .to_string();

        let authenticator = match Self::known_authenticator(explicit, &stored) {
            Some(auth) => auth,
            None if options.interactive && options.prompt_for_secret => {
                match prompt.secret(&format!("Enter password for {}@{}", user, host)) {
                    PromptReply::Value(secret) if !secret.is_empty() => {
                        Authenticator::Password(secret)
                    }
                    PromptReply::Value(_) => Authenticator::None,
                    PromptReply::Cancelled => {
                        return Err(BridgeError::cancelled("Cancelled."));
                    }
                }
            }
            None => Authenticator::None,
        };

        let profile = ConnectionProfile {
            host,
            user,
            authenticator,
            identifier: Some(identifier),
            port: network::SSH_DEFAULT_PORT,
            connect_timeout_ms: self.connect_timeout_ms,
        };
        self.logger.debug(
            "Resolved connection profile",
            Some(&serde_json::json!({
                "target": profile.label(),
                "identifier": profile.identifier,
                "auth": profile.authenticator.label(),
            })),
        );
        Ok(ResolvedTarget {
            profile,
            default_remote_dir: non_empty(stored.default_path.as_deref()).map(str::to_string),
        })
    }

    fn known_authenticator(explicit: &ExplicitArgs, stored: &HostEntry) -> Option<Authenticator> {
        if let Some(key) = non_empty(explicit.key.as_deref()) {
            return Some(Authenticator::KeyFile(PathBuf::from(key)));
        }
        if let Some(password) = explicit.password.as_deref().filter(|p| !p.is_empty()) {
            return Some(Authenticator::Password(password.to_string()));
        }
        if let Some(key) = non_empty(stored.key.as_deref()) {
            return Some(Authenticator::KeyFile(PathBuf::from(key)));
        }
        stored
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| Authenticator::Password(p.to_string()))
    }
}
