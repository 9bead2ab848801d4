use crate::channel::SecureChannel;
use crate::errors::BridgeError;
use crate::managers::stream::{BufferSink, CancelFlag, StreamMultiplexer, StreamSink};
use crate::services::logger::Logger;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One opened secure channel, owned by a single invocation.
///
/// The channel is released by [`Session::close`] or, failing that, on drop.
/// Closing twice is a no-op.
pub struct Session {
    logger: Logger,
    channel: Option<Box<dyn SecureChannel>>,
    cancel: CancelFlag,
}

impl Session {
    pub fn new(logger: &Logger, channel: Box<dyn SecureChannel>) -> Self {
        Self {
            logger: logger.child("session"),
            channel: Some(channel),
            cancel: CancelFlag::new(),
        }
    }

    /// Interrupt flag observed by buffered runs and between transfer steps.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ensure_not_cancelled(&self) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::cancelled("Interrupted"));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn channel(&mut self) -> Result<&mut Box<dyn SecureChannel>, BridgeError> {
        self.channel
            .as_mut()
            .ok_or_else(|| BridgeError::internal("Not connected"))
    }

    /// Runs `command` to completion and returns its buffered output.
    pub fn run(&mut self, command: &str) -> Result<CommandOutput, BridgeError> {
        self.run_with_input(command, None)
    }

    pub fn run_with_input(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput, BridgeError> {
        let mut sink = BufferSink::default();
        let exit_code = self.stream_with_input(
            command,
            stdin,
            &StreamMultiplexer::new(self.cancel.clone()),
            &mut sink,
        )?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&sink.stdout).to_string(),
            stderr: String::from_utf8_lossy(&sink.stderr).to_string(),
            exit_code,
        })
    }

    /// Runs `command`, relaying output into `sink` while it executes.
    pub fn stream(
        &mut self,
        command: &str,
        multiplexer: &StreamMultiplexer,
        sink: &mut dyn StreamSink,
    ) -> Result<i32, BridgeError> {
        self.stream_with_input(command, None, multiplexer, sink)
    }

    fn stream_with_input(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        multiplexer: &StreamMultiplexer,
        sink: &mut dyn StreamSink,
    ) -> Result<i32, BridgeError> {
        self.logger.debug(
            "exec",
            Some(&serde_json::json!({"command": command, "stdin": stdin.is_some()})),
        );
        let mut process = self.channel()?.exec(command, stdin)?;
        multiplexer.relay(process.as_mut(), sink)
    }

    pub fn read(&mut self, path: &str) -> Result<String, BridgeError> {
        let bytes = self.channel()?.read_file(path)?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    pub fn write(&mut self, path: &str, content: &[u8]) -> Result<(), BridgeError> {
        self.channel()?.write_file(path, content)
    }

    pub fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, BridgeError> {
        self.logger.debug(
            "upload",
            Some(&serde_json::json!({
                "local": local.display().to_string(),
                "remote": remote,
            })),
        );
        self.channel()?.upload(local, remote)
    }

    pub fn close(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        if let Err(err) = channel.close() {
            self.logger.warn(
                "Channel close reported an error",
                Some(&serde_json::json!({"error": err.message})),
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
