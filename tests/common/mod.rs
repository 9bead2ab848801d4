#![allow(dead_code)]

use hostbridge::channel::{
    ConnectionProfile, Connector, HostVerification, OpenError, RemoteProcess, SecureChannel,
};
use hostbridge::errors::BridgeError;
use hostbridge::services::prompt::{Prompt, PromptReply};
use hostbridge::services::remediation::Remediation;
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

pub static ENV_LOCK: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

pub fn tmp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open {
        host: String,
        verification: HostVerification,
    },
    Exec {
        command: String,
        stdin: Option<Vec<u8>>,
    },
    Read(String),
    Write(String, Vec<u8>),
    Upload {
        local: PathBuf,
        remote: String,
    },
    Close,
    Forget(String),
}

/// Ordered record of everything the fakes were asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Pending,
}

/// What a fake remote command emits, one step per poll.
#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    pub stdout: Vec<Step>,
    pub stderr: Vec<Step>,
    pub exit_code: i32,
    /// Stdout steps still queued when completion is signalled.
    pub linger: usize,
    /// Idle keepalives answered before the transport reports a lost host.
    pub keepalives_before_drop: Option<usize>,
}

impl ExecScript {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn stdout(mut self, bytes: &[u8]) -> Self {
        self.stdout.push(Step::Data(bytes.to_vec()));
        self
    }

    pub fn pending(mut self) -> Self {
        self.stdout.push(Step::Pending);
        self
    }

    pub fn stderr(mut self, bytes: &[u8]) -> Self {
        self.stderr.push(Step::Data(bytes.to_vec()));
        self
    }

    pub fn linger(mut self, steps: usize) -> Self {
        self.linger = steps;
        self
    }

    pub fn drop_connection_after(mut self, keepalives: usize) -> Self {
        self.keepalives_before_drop = Some(keepalives);
        self
    }
}

pub struct FakeProcess {
    stdout: VecDeque<Step>,
    stderr: VecDeque<Step>,
    exit_code: i32,
    linger: usize,
    keepalives_left: Option<usize>,
}

impl FakeProcess {
    pub fn new(script: ExecScript) -> Self {
        Self {
            stdout: script.stdout.into(),
            stderr: script.stderr.into(),
            exit_code: script.exit_code,
            linger: script.linger,
            keepalives_left: script.keepalives_before_drop,
        }
    }

    fn read(steps: &mut VecDeque<Step>, buf: &mut [u8]) -> io::Result<usize> {
        match steps.pop_front() {
            None => Ok(0),
            Some(Step::Pending) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    steps.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl RemoteProcess for FakeProcess {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Self::read(&mut self.stdout, buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Self::read(&mut self.stderr, buf)
    }

    fn finished(&mut self) -> bool {
        self.stdout.len() <= self.linger
    }

    fn keepalive(&mut self) -> Result<(), BridgeError> {
        match self.keepalives_left.as_mut() {
            Some(0) => Err(BridgeError::channel("Connection lost while waiting for output")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn exit_code(&mut self) -> Result<i32, BridgeError> {
        Ok(self.exit_code)
    }
}

pub type Responder = Arc<dyn Fn(&str) -> ExecScript + Send + Sync>;

#[derive(Clone)]
pub struct ChannelBehavior {
    pub responder: Responder,
    pub fail_upload: bool,
    pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Default for ChannelBehavior {
    fn default() -> Self {
        Self {
            responder: Arc::new(|_| ExecScript::ok()),
            fail_upload: false,
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl ChannelBehavior {
    pub fn respond(mut self, responder: impl Fn(&str) -> ExecScript + Send + Sync + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }
}

pub struct FakeChannel {
    journal: Journal,
    behavior: ChannelBehavior,
    closed: bool,
}

impl FakeChannel {
    pub fn new(journal: Journal, behavior: ChannelBehavior) -> Self {
        Self {
            journal,
            behavior,
            closed: false,
        }
    }
}

impl SecureChannel for FakeChannel {
    fn exec(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Box<dyn RemoteProcess>, BridgeError> {
        self.journal.push(Call::Exec {
            command: command.to_string(),
            stdin: stdin.map(|bytes| bytes.to_vec()),
        });
        Ok(Box::new(FakeProcess::new((self.behavior.responder)(command))))
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, BridgeError> {
        self.journal.push(Call::Read(path.to_string()));
        self.behavior
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::not_found(format!("Remote path not found: {}", path)))
    }

    fn write_file(&mut self, path: &str, content: &[u8]) -> Result<(), BridgeError> {
        self.journal.push(Call::Write(path.to_string(), content.to_vec()));
        self.behavior
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, BridgeError> {
        self.journal.push(Call::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        if self.behavior.fail_upload {
            return Err(BridgeError::channel("permission denied"));
        }
        Ok(std::fs::metadata(local)?.len())
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        if !self.closed {
            self.closed = true;
            self.journal.push(Call::Close);
        }
        Ok(())
    }
}

pub type OpenOutcome = Result<(), OpenError>;

/// Hands out fake channels; scripted open outcomes are consumed in order and
/// every open after the script runs out succeeds.
pub struct FakeConnector {
    pub journal: Journal,
    pub behavior: ChannelBehavior,
    outcomes: Mutex<VecDeque<OpenOutcome>>,
}

impl FakeConnector {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            behavior: ChannelBehavior::default(),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: ChannelBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_outcomes(self, outcomes: Vec<OpenOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }
}

impl Connector for FakeConnector {
    fn open(
        &self,
        profile: &ConnectionProfile,
        verification: HostVerification,
    ) -> Result<Box<dyn SecureChannel>, OpenError> {
        self.journal.push(Call::Open {
            host: profile.host.clone(),
            verification,
        });
        if let Some(outcome) = self.outcomes.lock().unwrap().pop_front() {
            outcome?;
        }
        Ok(Box::new(FakeChannel::new(
            self.journal.clone(),
            self.behavior.clone(),
        )))
    }
}

pub fn mismatch(host: &str) -> OpenOutcome {
    Err(OpenError::IdentityMismatch {
        host: host.to_string(),
        fingerprint: "SHA256:new".to_string(),
    })
}

pub fn refused(host: &str) -> OpenOutcome {
    Err(OpenError::ConnectFailed {
        host: host.to_string(),
        reason: "connection refused".to_string(),
    })
}

pub struct FakeRemediation {
    journal: Journal,
    fail: bool,
}

impl FakeRemediation {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: false,
        }
    }

    pub fn failing(journal: Journal) -> Self {
        Self {
            journal,
            fail: true,
        }
    }
}

impl Remediation for FakeRemediation {
    fn forget(&self, host: &str) -> Result<(), BridgeError> {
        self.journal.push(Call::Forget(host.to_string()));
        if self.fail {
            return Err(BridgeError::internal("ssh-keygen not installed"));
        }
        Ok(())
    }
}

/// Answers prompts from a fixed script and remembers what it was asked.
pub struct ScriptedPrompt {
    secret: PromptReply<String>,
    choice: PromptReply<usize>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(secret: PromptReply<String>, choice: PromptReply<usize>) -> Self {
        Self {
            secret,
            choice,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn choosing(choice: usize) -> Self {
        Self::new(PromptReply::Cancelled, PromptReply::Value(choice))
    }
}

impl Prompt for ScriptedPrompt {
    fn secret(&self, label: &str) -> PromptReply<String> {
        self.asked.lock().unwrap().push(label.to_string());
        self.secret.clone()
    }

    fn choose(&self, question: &str, _options: &[&str]) -> PromptReply<usize> {
        self.asked.lock().unwrap().push(question.to_string());
        self.choice.clone()
    }
}

pub fn profile(host: &str) -> ConnectionProfile {
    ConnectionProfile {
        host: host.to_string(),
        user: "pi".to_string(),
        authenticator: hostbridge::channel::Authenticator::None,
        identifier: Some("pi1".to_string()),
        port: 22,
        connect_timeout_ms: 1_000,
    }
}
