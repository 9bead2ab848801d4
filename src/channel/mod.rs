//! The secure remote-shell capability the bridge is built on.
//!
//! Everything above this module talks to remote hosts only through
//! [`Connector`], [`SecureChannel`] and [`RemoteProcess`]; the ssh2 backed
//! implementation lives in [`ssh`].

pub mod ssh;

use crate::constants::network;
use crate::errors::BridgeError;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    Password(String),
    KeyFile(PathBuf),
    None,
}

impl Authenticator {
    pub fn is_none(&self) -> bool {
        matches!(self, Authenticator::None)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Authenticator::Password(_) => "password",
            Authenticator::KeyFile(_) => "key",
            Authenticator::None => "agent",
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authenticator::Password(_) => write!(f, "Password(<redacted>)"),
            Authenticator::KeyFile(path) => write!(f, "KeyFile({})", path.display()),
            Authenticator::None => write!(f, "None"),
        }
    }
}

/// Effective connection parameters for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub host: String,
    pub user: String,
    pub authenticator: Authenticator,
    pub identifier: Option<String>,
    pub port: u16,
    pub connect_timeout_ms: u64,
}

impl ConnectionProfile {
    pub fn label(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Name under which the host is recorded in known_hosts.
    pub fn known_hosts_name(&self) -> String {
        if self.port == network::SSH_DEFAULT_PORT {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVerification {
    /// Compare the presented host identity with the recorded one.
    Strict,
    /// Skip the comparison. Only used after an explicit accept decision.
    Untrusted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("Could not connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },
    #[error("Host identity for {host} does not match the recorded one (presented {fingerprint})")]
    IdentityMismatch { host: String, fingerprint: String },
}

pub trait Connector: Send + Sync {
    fn open(
        &self,
        profile: &ConnectionProfile,
        verification: HostVerification,
    ) -> Result<Box<dyn SecureChannel>, OpenError>;
}

pub trait SecureChannel: Send {
    /// Starts `command`. When `stdin` is given it is written in full and
    /// followed by EOF before the process is handed back for polling.
    fn exec(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Box<dyn RemoteProcess>, BridgeError>;

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, BridgeError>;

    fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), BridgeError>;

    /// Copies a local file to `remote`, returning the number of bytes sent.
    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, BridgeError>;

    /// Must tolerate repeated calls and partially opened channels.
    fn close(&mut self) -> Result<(), BridgeError>;
}

/// A running remote command polled without blocking.
///
/// `read_stdout`/`read_stderr` return `ErrorKind::WouldBlock` when nothing is
/// pending yet and `Ok(0)` once the stream has no further data.
pub trait RemoteProcess: Send {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// True once the remote side signalled completion.
    fn finished(&mut self) -> bool;

    /// Called on idle poll iterations. A transport that can no longer reach
    /// the host reports it here, so a silent drop ends the stream.
    fn keepalive(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn exit_code(&mut self) -> Result<i32, BridgeError>;
}
