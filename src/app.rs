use crate::channel::ssh::SshConnector;
use crate::channel::Connector;
use crate::cli::{Cli, Commands, TargetArgs};
use crate::errors::{BridgeError, BridgeErrorKind};
use crate::managers::hosts::{AliasTarget, HostProbe, HostsManager};
use crate::managers::session::Session;
use crate::managers::stream::{CancelFlag, StdioSink, StreamMultiplexer};
use crate::managers::transfer::{TransferOrchestrator, TransferPlan};
use crate::services::logger::{LogLevel, Logger};
use crate::services::prompt::{NoPrompt, Prompt, TerminalPrompt};
use crate::services::registry::HostRegistry;
use crate::services::remediation::{KnownHostsRemediation, Remediation};
use crate::services::resolver::{ExplicitArgs, ParameterResolver, ResolveOptions, ResolvedTarget};
use crate::services::trust::{PromptPolicy, RejectPolicy, TrustPolicy, TrustResolver};
use crate::services::validation::Validation;
use crate::utils::feature_flags::is_no_prompt_enabled;
use crate::utils::invocation::{alias_dir, current_identity_hint, AliasOutcome};
use crate::utils::paths::{resolve_known_hosts_path, resolve_registry_path};
use crate::utils::table::{format_row, rule};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// The one remote operation an invocation performs once its session is open.
enum Operation {
    Run(String),
    Stream(String),
    Read(String),
    Write(String, Vec<u8>),
    Send(TransferPlan),
}

pub struct App {
    pub logger: Logger,
    validation: Validation,
    registry: Arc<HostRegistry>,
    connector: Arc<dyn Connector>,
    remediation: Arc<dyn Remediation>,
    prompt: Arc<dyn Prompt>,
    interactive: bool,
    cancel: CancelFlag,
    identity_hint: Option<String>,
    alias: Option<AliasTarget>,
    cwd: PathBuf,
}

impl App {
    pub fn new(
        logger: Logger,
        registry: Arc<HostRegistry>,
        connector: Arc<dyn Connector>,
        remediation: Arc<dyn Remediation>,
        prompt: Arc<dyn Prompt>,
        interactive: bool,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            logger,
            validation: Validation::new(),
            registry,
            connector,
            remediation,
            prompt,
            interactive,
            cancel,
            identity_hint: None,
            alias: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_identity_hint(mut self, hint: Option<String>) -> Self {
        self.identity_hint = hint;
        self
    }

    pub fn with_alias_target(mut self, alias: Option<AliasTarget>) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Production wiring: ssh2 transport, terminal prompts, `ssh-keygen`
    /// remediation and the registry at its resolved location.
    pub fn initialize(cli: &Cli, cancel: CancelFlag) -> Result<Self, BridgeError> {
        let mut logger = Logger::new("hostbridge");
        if cli.verbose {
            logger.set_level(LogLevel::Debug);
        }
        let registry_path = resolve_registry_path(cli.config.as_deref());
        logger.debug(
            "Using host registry",
            Some(&serde_json::json!({"path": registry_path.display().to_string()})),
        );
        let registry = Arc::new(HostRegistry::open(registry_path)?);
        let known_hosts = resolve_known_hosts_path();
        let connector: Arc<dyn Connector> =
            Arc::new(SshConnector::new(&logger, known_hosts.clone()));
        let remediation: Arc<dyn Remediation> =
            Arc::new(KnownHostsRemediation::new(&logger, known_hosts));

        let interactive = !(cli.no_prompt || is_no_prompt_enabled());
        let prompt: Arc<dyn Prompt> = if interactive {
            Arc::new(TerminalPrompt)
        } else {
            Arc::new(NoPrompt)
        };
        let alias = alias_dir().and_then(|dir| {
            let executable = std::env::current_exe().ok()?;
            Some(AliasTarget { dir, executable })
        });

        Ok(Self::new(
            logger,
            registry,
            connector,
            remediation,
            prompt,
            interactive,
            cancel,
        )
        .with_identity_hint(current_identity_hint())
        .with_alias_target(alias))
    }

    fn trust_resolver(&self) -> TrustResolver {
        TrustResolver::new(&self.logger, self.connector.clone(), self.remediation.clone())
            .with_cancel(self.cancel.clone())
    }

    /// Runs one command to completion and returns the process exit status.
    /// Blocking; callers on an async runtime use `spawn_blocking`.
    pub fn execute(&self, command: Commands) -> Result<i32, BridgeError> {
        match command {
            Commands::Run { command, target } => {
                self.run_remote(target, true, |_| Ok(Operation::Run(command)))
            }
            Commands::RunStream { command, target } => {
                self.run_remote(target, true, |_| Ok(Operation::Stream(command)))
            }
            Commands::Read { path, target } => {
                self.run_remote(target, true, |_| Ok(Operation::Read(path)))
            }
            Commands::Write {
                path,
                content,
                target,
            } => self.run_remote(target, true, |_| {
                let bytes = match content {
                    Some(text) => text.into_bytes(),
                    None => {
                        let mut buf = Vec::new();
                        std::io::stdin().read_to_end(&mut buf)?;
                        buf
                    }
                };
                Ok(Operation::Write(path, bytes))
            }),
            // Elevation may bring its own secret, so send never prompts upfront.
            Commands::Send {
                local_path,
                remote_path,
                sudo,
                sudo_password,
                target,
            } => self.run_remote(target, false, |resolved| {
                TransferPlan::resolve(
                    &local_path,
                    remote_path.as_deref(),
                    resolved.default_remote_dir.as_deref(),
                    sudo,
                    sudo_password,
                    &self.cwd,
                )
                .map(Operation::Send)
            }),
            Commands::Add {
                name,
                host,
                user,
                password,
                key,
            } => self.add_host(&name, &host, &user, password.as_deref(), key.as_deref()),
            Commands::Remove { name } => {
                let alias = self.hosts().remove(&name)?;
                println!("Host '{}' removed from {}", name, self.registry.path().display());
                if let Some(AliasOutcome::Removed(link)) = alias {
                    println!("Removed symlink: {}", link.display());
                }
                Ok(0)
            }
            Commands::List => {
                self.print_list();
                Ok(0)
            }
            Commands::SetDefault { name } => {
                self.hosts().set_default(&name)?;
                println!("Default host set to '{}'", name);
                Ok(0)
            }
            Commands::SetPath { name, path } => {
                self.hosts().set_path(&name, &path)?;
                println!("Default path for '{}' set to '{}'", name, path.trim());
                Ok(0)
            }
            Commands::Status { name } => self.print_status(name.as_deref()),
            Commands::CheckSsh => self.print_key_check(),
        }
    }

    fn hosts(&self) -> HostsManager {
        HostsManager::new(
            &self.logger,
            self.validation.clone(),
            self.registry.clone(),
            self.alias.clone(),
        )
    }

    fn run_remote(
        &self,
        target: TargetArgs,
        prompt_for_secret: bool,
        prepare: impl FnOnce(&ResolvedTarget) -> Result<Operation, BridgeError>,
    ) -> Result<i32, BridgeError> {
        let explicit = ExplicitArgs::from(target);
        let snapshot = self.registry.snapshot();
        let options = ResolveOptions {
            interactive: self.interactive,
            prompt_for_secret,
        };
        let resolved = ParameterResolver::new(&self.logger).resolve(
            &explicit,
            self.identity_hint.as_deref(),
            &snapshot,
            self.prompt.as_ref(),
            options,
        )?;
        let operation = prepare(&resolved)?;
        if self.cancel.is_cancelled() {
            return Err(BridgeError::cancelled("Interrupted"));
        }

        eprintln!(
            "Using host: {} ({})",
            resolved.display_name(),
            resolved.profile.host
        );
        let prompt_policy = PromptPolicy::new(self.prompt.clone());
        let policy: &dyn TrustPolicy = if self.interactive {
            &prompt_policy
        } else {
            &RejectPolicy
        };
        let report = self.trust_resolver().open(&resolved.profile, policy)?;
        if report.untrusted {
            eprintln!("Warning: host identity was not verified for this connection.");
        }
        let mut session = report.session;
        let result = self.perform(&mut session, operation);
        session.close();
        result
    }

    fn perform(&self, session: &mut Session, operation: Operation) -> Result<i32, BridgeError> {
        match operation {
            Operation::Run(command) => {
                let output = session.run(&command)?;
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
                Ok(output.exit_code)
            }
            Operation::Stream(command) => {
                let multiplexer = StreamMultiplexer::new(self.cancel.clone());
                session.stream(&command, &multiplexer, &mut StdioSink::new())
            }
            Operation::Read(path) => {
                print!("{}", session.read(&path)?);
                Ok(0)
            }
            Operation::Write(path, content) => {
                session.write(&path, &content)?;
                println!("Written to {}", path);
                Ok(0)
            }
            Operation::Send(plan) => {
                TransferOrchestrator::new(&self.logger).send(session, &plan, &mut |line| {
                    eprintln!("{}", line)
                })?;
                Ok(0)
            }
        }
    }

    fn add_host(
        &self,
        name: &str,
        host: &str,
        user: &str,
        password: Option<&str>,
        key: Option<&str>,
    ) -> Result<i32, BridgeError> {
        let hosts = self.hosts();
        if self.registry.snapshot().contains(name.trim()) {
            println!("Warning: host '{}' already exists. Overwriting.", name.trim());
        }
        let outcome = hosts.add(name, host, user, password, key)?;
        if outcome.stored_password {
            println!("Warning: the password is stored in plain text in the registry.");
        }
        println!("Host '{}' added to {}", name.trim(), self.registry.path().display());
        match outcome.alias {
            Some(AliasOutcome::Created(link)) => println!("Created symlink: {}", link.display()),
            Some(AliasOutcome::AlreadyExists(link)) => {
                println!("Symlink {} already exists.", link.display())
            }
            _ => {}
        }
        Ok(0)
    }

    fn print_list(&self) {
        let widths = [10, 20, 10, 10, 30];
        println!(
            "{}",
            format_row(&["Name", "Host", "User", "Default", "Default Path"], &widths)
        );
        println!("{}", rule(&widths));
        for row in self.hosts().list() {
            println!(
                "{}",
                format_row(
                    &[
                        &row.name,
                        if row.host.is_empty() { "N/A" } else { &row.host },
                        &row.user,
                        if row.is_default { "Yes" } else { "" },
                        row.default_path.as_deref().unwrap_or("N/A"),
                    ],
                    &widths,
                )
            );
        }
    }

    fn probe(&self) -> HostProbe {
        HostProbe::new(
            &self.logger,
            self.trust_resolver(),
            self.prompt.clone(),
            self.interactive,
        )
    }

    fn print_status(&self, name: Option<&str>) -> Result<i32, BridgeError> {
        let snapshot = self.registry.snapshot();
        let rows = self.probe().status(&snapshot, name)?;
        let widths = [10, 20, 20, 10];
        println!("{}", format_row(&["Name", "Host", "Hostname", "Status"], &widths));
        println!("{}", rule(&widths));
        for row in rows {
            println!(
                "{}",
                format_row(
                    &[
                        &row.name,
                        row.host.as_deref().unwrap_or("N/A"),
                        row.hostname.as_deref().unwrap_or("N/A"),
                        row.status.label(),
                    ],
                    &widths,
                )
            );
        }
        Ok(0)
    }

    fn print_key_check(&self) -> Result<i32, BridgeError> {
        let snapshot = self.registry.snapshot();
        let rows = self.probe().check_keys(&snapshot);
        let widths = [10, 20, 20];
        println!("{}", format_row(&["Name", "Host", "Status"], &widths));
        println!("{}", rule(&widths));
        for row in rows {
            let label = row.result.label();
            println!(
                "{}",
                format_row(
                    &[&row.name, row.host.as_deref().unwrap_or("N/A"), &label],
                    &widths,
                )
            );
        }
        Ok(0)
    }
}

/// Prints `err` for the operator and returns the exit status for it.
pub fn report_error(err: &BridgeError) -> i32 {
    if err.kind == BridgeErrorKind::Cancelled {
        eprintln!("\nCancelled.");
        return err.exit_code();
    }
    eprintln!("Error: {}", err.message);
    if let Some(hint) = err.hint.as_ref() {
        eprintln!("Hint: {}", hint);
    }
    if err.kind == BridgeErrorKind::IdentityMismatch {
        eprintln!("The host may have been reinstalled. Run `hostbridge check-ssh` to review host keys.");
    }
    err.exit_code()
}
