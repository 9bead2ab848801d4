pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const TIMEOUT_CONNECT_MS: u64 = 5_000;
    pub const TIMEOUT_STATUS_PROBE_MS: u64 = 3_000;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 30;
}

pub mod stream {
    /// Upper bound for a single relayed chunk.
    pub const CHUNK_SIZE: usize = 1024;
    /// Sleep between poll iterations that moved no data.
    pub const IDLE_SLEEP_MS: u64 = 50;
    /// Final drain passes after completion before giving up on a channel that keeps
    /// reporting "would block".
    pub const DRAIN_IDLE_PASSES: usize = 3;
}

pub mod defaults {
    pub const USER: &str = "pi";
    pub const STAGING_DIR: &str = "/tmp";
    pub const UNKNOWN_HOSTNAME: &str = "unknown";
    pub const BINARY_NAME: &str = "hostbridge";
}

pub mod exit {
    /// Status reported for a remote command that ended on a signal.
    pub const REMOTE_SIGNALLED: i32 = 255;
    /// How long an interrupted invocation waits for the worker to wind down.
    pub const INTERRUPT_GRACE_MS: u64 = 1_000;
}

pub mod env {
    pub const CONFIG_PATH: &str = "HOSTBRIDGE_CONFIG";
    pub const NO_PROMPT: &str = "HOSTBRIDGE_NO_PROMPT";
    pub const KNOWN_HOSTS_PATH: &str = "HOSTBRIDGE_KNOWN_HOSTS";
}
