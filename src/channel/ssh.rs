use crate::channel::{
    Authenticator, ConnectionProfile, Connector, HostVerification, OpenError, RemoteProcess,
    SecureChannel,
};
use crate::constants::{exit, network};
use crate::errors::BridgeError;
use crate::services::logger::Logger;
use base64::Engine;
use ssh2::{CheckResult, KnownHostFileKind, OpenFlags, OpenType, Session, Sftp};
use std::fs;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct SshConnector {
    logger: Logger,
    known_hosts: Option<PathBuf>,
}

impl SshConnector {
    pub fn new(logger: &Logger, known_hosts: Option<PathBuf>) -> Self {
        Self {
            logger: logger.child("ssh"),
            known_hosts,
        }
    }

    fn connect_tcp(&self, profile: &ConnectionProfile) -> Result<TcpStream, OpenError> {
        let timeout = Duration::from_millis(profile.connect_timeout_ms);
        let addrs = (profile.host.as_str(), profile.port)
            .to_socket_addrs()
            .map_err(|err| connect_failed(profile, format!("cannot resolve host: {}", err)))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(Some(timeout)).ok();
                    tcp.set_write_timeout(Some(timeout)).ok();
                    return Ok(tcp);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(connect_failed(
            profile,
            last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "host resolved to no addresses".to_string()),
        ))
    }

    fn verify_host_key(
        &self,
        session: &Session,
        profile: &ConnectionProfile,
    ) -> Result<(), OpenError> {
        let (key, key_type) = session
            .host_key()
            .ok_or_else(|| connect_failed(profile, "server presented no host key"))?;
        let Some(path) = self.known_hosts.as_ref() else {
            self.logger
                .warn("No known_hosts location; host identity not checked", None);
            return Ok(());
        };
        let mut known = session
            .known_hosts()
            .map_err(|err| connect_failed(profile, format!("known_hosts init failed: {}", err)))?;
        let exists = path.exists();
        let loaded = exists && known.read_file(path, KnownHostFileKind::OpenSSH).is_ok();
        if exists && !loaded {
            self.logger.warn(
                "known_hosts could not be parsed; treating host as first contact",
                Some(&serde_json::json!({"path": path.display().to_string()})),
            );
        }

        match known.check_port(&profile.host, profile.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => Err(OpenError::IdentityMismatch {
                host: profile.host.clone(),
                fingerprint: fingerprint_host_key_sha256(session)
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
            CheckResult::NotFound => {
                let entry = profile.known_hosts_name();
                let recorded = known
                    .add(&entry, key, &entry, key_type.into())
                    .and_then(|_| {
                        if exists && !loaded {
                            return Ok(());
                        }
                        if let Some(parent) = path.parent() {
                            let _ = fs::create_dir_all(parent);
                        }
                        known.write_file(path, KnownHostFileKind::OpenSSH)
                    });
                match recorded {
                    Ok(()) => self.logger.info(
                        "Recorded new host identity",
                        Some(&serde_json::json!({
                            "host": entry,
                            "fingerprint": fingerprint_host_key_sha256(session),
                        })),
                    ),
                    Err(err) => self.logger.warn(
                        "Could not record new host identity",
                        Some(&serde_json::json!({"host": entry, "error": err.to_string()})),
                    ),
                }
                Ok(())
            }
            CheckResult::Failure => {
                self.logger.warn(
                    "Host identity check failed to complete; continuing",
                    Some(&serde_json::json!({"host": profile.host})),
                );
                Ok(())
            }
        }
    }
}

impl Connector for SshConnector {
    fn open(
        &self,
        profile: &ConnectionProfile,
        verification: HostVerification,
    ) -> Result<Box<dyn SecureChannel>, OpenError> {
        self.logger.debug(
            "Opening SSH session",
            Some(&serde_json::json!({
                "target": profile.label(),
                "port": profile.port,
                "auth": profile.authenticator.label(),
                "verification": format!("{:?}", verification),
            })),
        );
        let tcp = self.connect_tcp(profile)?;
        let mut session = Session::new()
            .map_err(|err| connect_failed(profile, format!("session init failed: {}", err)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(profile.connect_timeout_ms.min(u32::MAX as u64) as u32);
        session
            .handshake()
            .map_err(|err| connect_failed(profile, format!("handshake failed: {}", err)))?;

        if verification == HostVerification::Strict {
            self.verify_host_key(&session, profile)?;
        } else {
            self.logger.warn(
                "Host identity verification skipped for this connection",
                Some(&serde_json::json!({"host": profile.host})),
            );
        }

        authenticate(&session, profile)?;
        // Commands may legitimately run for a long time once connected.
        session.set_timeout(0);
        session.set_keepalive(true, network::KEEPALIVE_INTERVAL_SECS);

        let sftp = session
            .sftp()
            .map_err(|err| connect_failed(profile, format!("file channel failed: {}", err)))?;

        Ok(Box::new(SshChannel {
            logger: self.logger.clone(),
            session: Some(session),
            sftp: Some(sftp),
        }))
    }
}

fn authenticate(session: &Session, profile: &ConnectionProfile) -> Result<(), OpenError> {
    let result = match &profile.authenticator {
        Authenticator::KeyFile(path) => {
            session.userauth_pubkey_file(&profile.user, None, path, None)
        }
        Authenticator::Password(password) => session.userauth_password(&profile.user, password),
        Authenticator::None => session.userauth_agent(&profile.user),
    };
    result.map_err(|err| connect_failed(profile, format!("authentication failed: {}", err)))?;
    if !session.authenticated() {
        return Err(connect_failed(profile, "authentication failed"));
    }
    Ok(())
}

pub struct SshChannel {
    logger: Logger,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SshChannel {
    fn session(&self) -> Result<&Session, BridgeError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| BridgeError::internal("Not connected"))?;
        session.set_blocking(true);
        Ok(session)
    }

    fn sftp(&self) -> Result<&Sftp, BridgeError> {
        self.session()?;
        self.sftp
            .as_ref()
            .ok_or_else(|| BridgeError::internal("File channel is not open"))
    }
}

impl SecureChannel for SshChannel {
    fn exec(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Box<dyn RemoteProcess>, BridgeError> {
        let session = self.session()?.clone();
        let mut channel = session.channel_session().map_err(map_ssh_error)?;
        channel.exec(command).map_err(map_ssh_error)?;
        if let Some(input) = stdin {
            channel
                .write_all(input)
                .map_err(|err| BridgeError::channel(format!("SSH stdin write failed: {}", err)))?;
        }
        channel.send_eof().map_err(map_ssh_error)?;
        let stderr = channel.stderr();
        session.set_blocking(false);
        Ok(Box::new(SshProcess {
            logger: self.logger.clone(),
            session,
            channel,
            stderr,
            exit_code: None,
        }))
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, BridgeError> {
        let mut file = self.sftp()?.open(Path::new(path)).map_err(map_ssh_error)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|err| BridgeError::channel(format!("Failed to read {}: {}", path, err)))?;
        Ok(content)
    }

    fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), BridgeError> {
        let mut file = self.sftp()?.create(Path::new(path)).map_err(map_ssh_error)?;
        file.write_all(content)
            .map_err(|err| BridgeError::channel(format!("Failed to write {}: {}", path, err)))?;
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, BridgeError> {
        let mut local_file = fs::File::open(local).map_err(|err| {
            BridgeError::local_not_found(format!("{} is not readable: {}", local.display(), err))
        })?;
        let mode = local_file_mode(&local_file);
        let mut remote_file = self
            .sftp()?
            .open_mode(
                Path::new(remote),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                mode,
                OpenType::File,
            )
            .map_err(map_ssh_error)?;
        io::copy(&mut local_file, &mut remote_file)
            .map_err(|err| BridgeError::channel(format!("Upload to {} failed: {}", remote, err)))
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        drop(self.sftp.take());
        if let Some(session) = self.session.take() {
            session.set_blocking(true);
            if let Err(err) = session.disconnect(None, "closing", None) {
                self.logger.debug(
                    "SSH disconnect reported an error",
                    Some(&serde_json::json!({"error": err.to_string()})),
                );
            }
        }
        Ok(())
    }
}

struct SshProcess {
    logger: Logger,
    session: Session,
    channel: ssh2::Channel,
    stderr: ssh2::Stream,
    exit_code: Option<i32>,
}

impl RemoteProcess for SshProcess {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr.read(buf)
    }

    fn finished(&mut self) -> bool {
        self.channel.eof()
    }

    fn keepalive(&mut self) -> Result<(), BridgeError> {
        match self.session.keepalive_send() {
            Ok(_) => Ok(()),
            Err(err) => {
                let io_err: io::Error = err.into();
                if io_err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(());
                }
                Err(BridgeError::channel(format!(
                    "Connection lost while waiting for output: {}",
                    io_err
                )))
            }
        }
    }

    fn exit_code(&mut self) -> Result<i32, BridgeError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        self.session.set_blocking(true);
        self.channel.wait_close().map_err(map_ssh_error)?;
        let signal = self.channel.exit_signal().map_err(map_ssh_error)?.exit_signal;
        if let Some(name) = signal.as_deref() {
            self.logger.warn(
                "Remote command terminated by signal",
                Some(&serde_json::json!({"signal": name})),
            );
        }
        let status = self.channel.exit_status().map_err(map_ssh_error)?;
        let code = remote_exit_code(status, signal.as_deref());
        self.exit_code = Some(code);
        Ok(code)
    }
}

impl Drop for SshProcess {
    fn drop(&mut self) {
        self.session.set_blocking(true);
    }
}

#[cfg(unix)]
fn local_file_mode(file: &fs::File) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    file.metadata()
        .map(|meta| (meta.permissions().mode() & 0o777) as i32)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn local_file_mode(_file: &fs::File) -> i32 {
    0o644
}

/// libssh2 reports status 0 when no exit-status message arrived, which is the
/// case for a command killed by a signal.
fn remote_exit_code(status: i32, signal: Option<&str>) -> i32 {
    match signal {
        Some(_) => exit::REMOTE_SIGNALLED,
        None => status,
    }
}

fn connect_failed(profile: &ConnectionProfile, reason: impl Into<String>) -> OpenError {
    OpenError::ConnectFailed {
        host: profile.host.clone(),
        reason: reason.into(),
    }
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

fn map_ssh_error(err: ssh2::Error) -> BridgeError {
    let io_err: io::Error = err.into();
    match io_err.kind() {
        io::ErrorKind::TimedOut => BridgeError::channel("SSH operation timed out"),
        io::ErrorKind::NotFound => BridgeError::not_found(format!("Remote path not found: {}", io_err)),
        _ => BridgeError::channel(format!("SSH error: {}", io_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signalled_command_never_reports_success() {
        assert_eq!(remote_exit_code(0, Some("KILL")), 255);
        assert_eq!(remote_exit_code(0, Some("TERM")), 255);
    }

    #[test]
    fn plain_exit_status_passes_through() {
        assert_eq!(remote_exit_code(0, None), 0);
        assert_eq!(remote_exit_code(3, None), 3);
    }
}
