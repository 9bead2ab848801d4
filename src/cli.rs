use crate::services::resolver::ExplicitArgs;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run commands, stream output and move files on remote hosts over SSH.
#[derive(Parser, Debug)]
#[command(name = "hostbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the host registry (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Never prompt; missing secrets stay empty and changed host keys are rejected
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection overrides shared by the remote commands.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Registered host to use (e.g. pi1)
    #[arg(long = "target", visible_alias = "pi", value_name = "NAME")]
    pub target: Option<String>,

    /// Override hostname or IP
    #[arg(long)]
    pub host: Option<String>,

    /// Override SSH username
    #[arg(long)]
    pub user: Option<String>,

    /// Override SSH password
    #[arg(long)]
    pub password: Option<String>,

    /// Override path to SSH private key
    #[arg(long, value_name = "FILE")]
    pub key: Option<String>,
}

impl From<TargetArgs> for ExplicitArgs {
    fn from(args: TargetArgs) -> Self {
        ExplicitArgs {
            identifier: args.target,
            host: args.host,
            user: args.user,
            password: args.password,
            key: args.key,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command and print its output when it finishes
    Run {
        command: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run a command and stream its output while it runs
    RunStream {
        command: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print a remote file
    Read {
        path: String,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Write a remote file from an argument or stdin
    Write {
        path: String,
        /// Content to write; read from stdin when omitted
        content: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Send a local file, creating the remote directory first
    Send {
        local_path: PathBuf,
        /// Remote destination (defaults to the host's default path)
        remote_path: Option<String>,
        /// Move the file into place with sudo
        #[arg(long)]
        sudo: bool,
        /// Sudo password for the remote user
        #[arg(long, value_name = "PASSWORD")]
        sudo_password: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Register a host
    Add {
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        user: String,
        /// Stored in plain text in the registry
        #[arg(long)]
        password: Option<String>,
        #[arg(long, value_name = "FILE")]
        key: Option<String>,
    },

    /// Remove a registered host
    Remove { name: String },

    /// List registered hosts
    List,

    /// Set the default host
    SetDefault { name: String },

    /// Set the default remote directory for a host
    SetPath { name: String, path: String },

    /// Check which hosts are reachable
    Status { name: Option<String> },

    /// Check SSH host keys for all hosts
    CheckSsh,
}

impl Commands {
    /// True for commands that open a session to a single resolved target.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Commands::Run { .. }
                | Commands::RunStream { .. }
                | Commands::Read { .. }
                | Commands::Write { .. }
                | Commands::Send { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pi_alias_and_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "hostbridge",
            "run",
            "uptime",
            "--pi",
            "pi2",
            "--no-prompt",
            "--config",
            "/tmp/hosts.json",
        ])
        .unwrap();
        assert!(cli.no_prompt);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/hosts.json")));
        match cli.command {
            Commands::Run { command, target } => {
                assert_eq!(command, "uptime");
                assert_eq!(target.target.as_deref(), Some("pi2"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn send_accepts_optional_remote_and_sudo() {
        let cli = Cli::try_parse_from([
            "hostbridge",
            "send",
            "cfg/app.yml",
            "--sudo",
            "--sudo-password",
            "pw",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                local_path,
                remote_path,
                sudo,
                sudo_password,
                ..
            } => {
                assert_eq!(local_path, PathBuf::from("cfg/app.yml"));
                assert_eq!(remote_path, None);
                assert!(sudo);
                assert_eq!(sudo_password.as_deref(), Some("pw"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn add_requires_host_and_user() {
        assert!(Cli::try_parse_from(["hostbridge", "add", "pi3", "--host", "10.0.0.4"]).is_err());
    }
}
