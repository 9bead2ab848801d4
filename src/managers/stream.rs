use crate::channel::RemoteProcess;
use crate::constants::stream as stream_constants;
use crate::errors::BridgeError;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STDERR_PREFIX: &[u8] = b"ERROR: ";

/// Receives relayed output as it arrives.
pub trait StreamSink {
    fn stdout(&mut self, chunk: &[u8]) -> io::Result<()>;
    fn stderr(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Relays to the local stdout/stderr, flushing every chunk. Stderr lines are
/// prefixed so the two channels stay distinguishable on a shared terminal.
pub struct StdioSink {
    stderr_at_line_start: bool,
}

impl StdioSink {
    pub fn new() -> Self {
        Self {
            stderr_at_line_start: true,
        }
    }
}

impl Default for StdioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSink for StdioSink {
    fn stdout(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(chunk)?;
        out.flush()
    }

    fn stderr(&mut self, chunk: &[u8]) -> io::Result<()> {
        let prefixed = prefix_lines(chunk, STDERR_PREFIX, &mut self.stderr_at_line_start);
        let mut err = io::stderr().lock();
        err.write_all(&prefixed)?;
        err.flush()
    }
}

/// Collects both channels in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl StreamSink for BufferSink {
    fn stdout(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.stdout.extend_from_slice(chunk);
        Ok(())
    }

    fn stderr(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.stderr.extend_from_slice(chunk);
        Ok(())
    }
}

fn prefix_lines(chunk: &[u8], prefix: &[u8], at_line_start: &mut bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunk.len() + prefix.len());
    for &byte in chunk {
        if *at_line_start {
            out.extend_from_slice(prefix);
            *at_line_start = false;
        }
        out.push(byte);
        if byte == b'\n' {
            *at_line_start = true;
        }
    }
    out
}

/// Shared interrupt flag, set from the signal listener and observed by the
/// poll loop between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Command running; both channels polled once per iteration.
    Running,
    /// Completion observed; reading whatever the remote still buffered.
    Draining,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pump {
    Relayed,
    Pending,
    Closed,
}

pub struct StreamMultiplexer {
    chunk_size: usize,
    idle_sleep: Duration,
    drain_idle_passes: usize,
    cancel: CancelFlag,
}

impl StreamMultiplexer {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            chunk_size: stream_constants::CHUNK_SIZE,
            idle_sleep: Duration::from_millis(stream_constants::IDLE_SLEEP_MS),
            drain_idle_passes: stream_constants::DRAIN_IDLE_PASSES,
            cancel,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Relays `process` output into `sink` until the command completes and
    /// both channels are drained, then returns the remote exit code.
    ///
    /// Bytes already handed to the sink stay delivered when the channel fails
    /// or the flag is cancelled mid-stream.
    pub fn relay(
        &self,
        process: &mut dyn RemoteProcess,
        sink: &mut dyn StreamSink,
    ) -> Result<i32, BridgeError> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut state = StreamState::Running;
        loop {
            state = match state {
                StreamState::Running => {
                    if self.cancel.is_cancelled() {
                        return Err(BridgeError::cancelled("Interrupted while streaming"));
                    }
                    let out = self.pump(Channel::Stdout, process, sink, &mut buf)?;
                    let err = self.pump(Channel::Stderr, process, sink, &mut buf)?;
                    let moved = out == Pump::Relayed || err == Pump::Relayed;
                    if !moved && process.finished() {
                        StreamState::Draining
                    } else {
                        if !moved {
                            process.keepalive()?;
                            std::thread::sleep(self.idle_sleep);
                        }
                        StreamState::Running
                    }
                }
                StreamState::Draining => {
                    self.drain(Channel::Stdout, process, sink, &mut buf)?;
                    self.drain(Channel::Stderr, process, sink, &mut buf)?;
                    StreamState::Done
                }
                StreamState::Done => return process.exit_code(),
            };
        }
    }

    fn drain(
        &self,
        channel: Channel,
        process: &mut dyn RemoteProcess,
        sink: &mut dyn StreamSink,
        buf: &mut [u8],
    ) -> Result<(), BridgeError> {
        let mut idle_passes = 0;
        loop {
            match self.pump(channel, process, sink, buf)? {
                Pump::Relayed => idle_passes = 0,
                Pump::Closed => return Ok(()),
                Pump::Pending => {
                    idle_passes += 1;
                    if idle_passes >= self.drain_idle_passes {
                        return Ok(());
                    }
                    std::thread::sleep(self.idle_sleep / self.drain_idle_passes.max(1) as u32);
                }
            }
        }
    }

    fn pump(
        &self,
        channel: Channel,
        process: &mut dyn RemoteProcess,
        sink: &mut dyn StreamSink,
        buf: &mut [u8],
    ) -> Result<Pump, BridgeError> {
        let read = match channel {
            Channel::Stdout => process.read_stdout(buf),
            Channel::Stderr => process.read_stderr(buf),
        };
        match read {
            Ok(0) => Ok(Pump::Closed),
            Ok(n) => {
                let relayed = match channel {
                    Channel::Stdout => sink.stdout(&buf[..n]),
                    Channel::Stderr => sink.stderr(&buf[..n]),
                };
                relayed.map_err(|err| {
                    BridgeError::internal(format!("Failed to relay output locally: {}", err))
                })?;
                Ok(Pump::Relayed)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Pump::Pending)
            }
            Err(err) => Err(BridgeError::channel(format!(
                "Remote {} failed mid-stream: {}",
                match channel {
                    Channel::Stdout => "stdout",
                    Channel::Stderr => "stderr",
                },
                err
            ))),
        }
    }
}
