//! Opening a secure channel under a host-identity trust decision.
//!
//! A mismatched host identity is never accepted or rejected silently: it is
//! handed to a [`TrustPolicy`], which may accept it for this connection only,
//! ask for the stale record to be forgotten and the open retried once, or
//! reject it.

use crate::channel::{ConnectionProfile, Connector, HostVerification, OpenError, SecureChannel};
use crate::errors::BridgeError;
use crate::managers::session::Session;
use crate::managers::stream::CancelFlag;
use crate::services::logger::Logger;
use crate::services::prompt::{Prompt, PromptReply};
use crate::services::remediation::Remediation;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Connect this once without verifying the host identity.
    Accept,
    /// Forget the recorded identity and retry the open once.
    RemediateAndRetry,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchEvent {
    pub host: String,
    pub fingerprint: String,
}

pub trait TrustPolicy: Send + Sync {
    fn decide(&self, event: &MismatchEvent) -> TrustDecision;
}

/// Used whenever nobody can be asked.
#[derive(Debug, Default)]
pub struct RejectPolicy;

impl TrustPolicy for RejectPolicy {
    fn decide(&self, _event: &MismatchEvent) -> TrustDecision {
        TrustDecision::Reject
    }
}

pub struct PromptPolicy {
    prompt: Arc<dyn Prompt>,
}

impl PromptPolicy {
    pub const OPTIONS: [&'static str; 3] = [
        "Forget the stored key and reconnect",
        "Connect this once without verifying",
        "Abort",
    ];

    pub fn new(prompt: Arc<dyn Prompt>) -> Self {
        Self { prompt }
    }
}

impl TrustPolicy for PromptPolicy {
    fn decide(&self, event: &MismatchEvent) -> TrustDecision {
        let question = format!(
            "WARNING: the host key for {} has changed (now {}). This can mean someone is intercepting the connection, or the host was reinstalled.",
            event.host, event.fingerprint
        );
        match self.prompt.choose(&question, &Self::OPTIONS) {
            PromptReply::Value(0) => TrustDecision::RemediateAndRetry,
            PromptReply::Value(1) => TrustDecision::Accept,
            _ => TrustDecision::Reject,
        }
    }
}

pub struct OpenReport {
    pub session: Session,
    /// The stale identity record was forgotten before the successful open.
    pub remediated: bool,
    /// Host identity verification was skipped for this session.
    pub untrusted: bool,
}

enum OpenState {
    Unopened,
    Opening(HostVerification),
    MismatchPending(MismatchEvent),
    Open(Box<dyn SecureChannel>, HostVerification),
    Closed(BridgeError),
}

pub struct TrustResolver {
    logger: Logger,
    connector: Arc<dyn Connector>,
    remediation: Arc<dyn Remediation>,
    cancel: CancelFlag,
}

impl TrustResolver {
    pub fn new(
        logger: &Logger,
        connector: Arc<dyn Connector>,
        remediation: Arc<dyn Remediation>,
    ) -> Self {
        Self {
            logger: logger.child("trust"),
            connector,
            remediation,
            cancel: CancelFlag::new(),
        }
    }

    /// Sessions opened from here observe `cancel`.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Opens a session for `profile`. Connection failures are returned as
    /// `ConnectFailed` without retrying; an identity mismatch goes through
    /// `policy`, and at most one retry follows a remediation.
    pub fn open(
        &self,
        profile: &ConnectionProfile,
        policy: &dyn TrustPolicy,
    ) -> Result<OpenReport, BridgeError> {
        if profile.host.trim().is_empty() {
            return Err(BridgeError::no_host("Host is empty"));
        }
        let mut remediated = false;
        let mut retried = false;
        let mut state = OpenState::Unopened;
        loop {
            state = match state {
                OpenState::Unopened => OpenState::Opening(HostVerification::Strict),
                OpenState::Opening(verification) => {
                    match self.connector.open(profile, verification) {
                        Ok(channel) => OpenState::Open(channel, verification),
                        Err(OpenError::ConnectFailed { host, reason }) => OpenState::Closed(
                            BridgeError::connect_failed(format!(
                                "Could not connect to {}: {}",
                                host, reason
                            )),
                        ),
                        Err(OpenError::IdentityMismatch { host, fingerprint }) => {
                            OpenState::MismatchPending(MismatchEvent { host, fingerprint })
                        }
                    }
                }
                OpenState::MismatchPending(event) if retried => {
                    OpenState::Closed(mismatch_error(&event).with_hint(
                        "The host key still did not match on the second attempt; verify the host out of band.",
                    ))
                }
                OpenState::MismatchPending(event) => {
                    let next = self.settle_mismatch(profile, policy, event, &mut remediated);
                    retried = matches!(next, OpenState::Opening(_));
                    next
                }
                OpenState::Open(channel, verification) => {
                    return Ok(OpenReport {
                        session: Session::new(&self.logger, channel)
                            .with_cancel(self.cancel.clone()),
                        remediated,
                        untrusted: verification == HostVerification::Untrusted,
                    });
                }
                OpenState::Closed(err) => return Err(err),
            };
        }
    }

    fn settle_mismatch(
        &self,
        profile: &ConnectionProfile,
        policy: &dyn TrustPolicy,
        event: MismatchEvent,
        remediated: &mut bool,
    ) -> OpenState {
        let decision = policy.decide(&event);
        self.logger.info(
            "Host identity mismatch",
            Some(&serde_json::json!({
                "host": event.host,
                "fingerprint": event.fingerprint,
                "decision": format!("{:?}", decision),
            })),
        );
        match decision {
            TrustDecision::Accept => {
                self.logger.warn(
                    "Proceeding without host identity verification",
                    Some(&serde_json::json!({"host": event.host})),
                );
                OpenState::Opening(HostVerification::Untrusted)
            }
            TrustDecision::RemediateAndRetry => {
                match self.remediation.forget(&profile.known_hosts_name()) {
                    Ok(()) => {
                        *remediated = true;
                        OpenState::Opening(HostVerification::Strict)
                    }
                    Err(err) => {
                        self.logger.error(
                            "Could not remove the stored host identity",
                            Some(&serde_json::json!({"host": event.host, "error": err.message})),
                        );
                        OpenState::Closed(mismatch_error(&event).with_hint(format!(
                            "Removing the stored key failed: {}",
                            err.message
                        )))
                    }
                }
            }
            TrustDecision::Reject => OpenState::Closed(mismatch_error(&event).with_hint(format!(
                "If the change is expected, run `ssh-keygen -R {}` and reconnect.",
                profile.known_hosts_name()
            ))),
        }
    }
}

fn mismatch_error(event: &MismatchEvent) -> BridgeError {
    BridgeError::identity_mismatch(format!(
        "Host key for {} has changed (presented {})",
        event.host, event.fingerprint
    ))
}
