use clap::Parser;
use hostbridge::app::{report_error, App};
use hostbridge::cli::Cli;
use hostbridge::constants::exit;
use hostbridge::errors::BridgeError;
use hostbridge::managers::stream::CancelFlag;
use hostbridge::utils::terminal::TerminalGuard;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cancel = CancelFlag::new();
    let terminal = TerminalGuard::capture();

    let app = match App::initialize(&cli, cancel.clone()) {
        Ok(app) => app,
        Err(err) => std::process::exit(report_error(&err)),
    };
    let command = cli.command;
    let mut task = tokio::task::spawn_blocking(move || app.execute(command));

    let finished = tokio::select! {
        joined = &mut task => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };
    let code = match finished {
        Some(joined) => finish(joined),
        None => {
            // Poll loops and transfer steps observe the flag and close the
            // session on their way out. A worker blocked in a prompt or an
            // upload does not, so it gets a bounded grace period.
            cancel.cancel();
            tokio::select! {
                joined = &mut task => finish(joined),
                _ = tokio::time::sleep(Duration::from_millis(exit::INTERRUPT_GRACE_MS)) => {
                    interrupted(&terminal)
                }
                _ = tokio::signal::ctrl_c() => interrupted(&terminal),
            }
        }
    };
    std::process::exit(code);
}

fn interrupted(terminal: &TerminalGuard) -> i32 {
    terminal.restore();
    report_error(&BridgeError::cancelled("Interrupted"))
}

fn finish(joined: Result<Result<i32, BridgeError>, tokio::task::JoinError>) -> i32 {
    match joined {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => report_error(&err),
        Err(err) => report_error(&BridgeError::internal(format!("Worker task failed: {}", err))),
    }
}
