use crate::errors::BridgeError;
use crate::services::logger::Logger;
use std::path::PathBuf;
use std::process::Command;

/// Removes a stale recorded host identity so the next connection records the
/// new one. Implementations must be idempotent.
pub trait Remediation: Send + Sync {
    fn forget(&self, host: &str) -> Result<(), BridgeError>;
}

/// Runs `ssh-keygen -R <host>` against the known_hosts file.
pub struct KnownHostsRemediation {
    logger: Logger,
    known_hosts: Option<PathBuf>,
}

impl KnownHostsRemediation {
    pub fn new(logger: &Logger, known_hosts: Option<PathBuf>) -> Self {
        Self {
            logger: logger.child("remediation"),
            known_hosts,
        }
    }
}

impl Remediation for KnownHostsRemediation {
    fn forget(&self, host: &str) -> Result<(), BridgeError> {
        let mut cmd = Command::new("ssh-keygen");
        cmd.arg("-R").arg(host);
        if let Some(path) = self.known_hosts.as_ref() {
            cmd.arg("-f").arg(path);
        }
        self.logger.debug(
            "Removing recorded host identity",
            Some(&serde_json::json!({"host": host})),
        );
        let output = cmd.output().map_err(|err| {
            BridgeError::internal(format!("Failed to run ssh-keygen: {}", err))
                .with_hint("Install the OpenSSH client tools or edit ~/.ssh/known_hosts by hand.")
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // A host that was never recorded is already in the desired state.
            if stderr.contains("not found in") {
                return Ok(());
            }
            return Err(BridgeError::internal(format!(
                "ssh-keygen -R {} failed: {}",
                host,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
