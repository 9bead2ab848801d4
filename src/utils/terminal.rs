//! Terminal state captured before any prompt runs.
//!
//! A prompt blocked in a secret read has echo switched off. When an interrupt
//! ends the invocation underneath it, the captured settings are written back
//! before the process exits.

#[cfg(unix)]
use std::fs::File;

pub struct TerminalGuard {
    #[cfg(unix)]
    saved: Option<(File, nix::sys::termios::Termios)>,
}

impl TerminalGuard {
    #[cfg(unix)]
    pub fn capture() -> Self {
        let saved = File::open("/dev/tty").ok().and_then(|tty| {
            nix::sys::termios::tcgetattr(&tty)
                .ok()
                .map(|termios| (tty, termios))
        });
        Self { saved }
    }

    #[cfg(not(unix))]
    pub fn capture() -> Self {
        Self {}
    }

    /// Puts echo and line settings back and shows the cursor again.
    pub fn restore(&self) {
        #[cfg(unix)]
        if let Some((tty, termios)) = &self.saved {
            let _ = nix::sys::termios::tcsetattr(tty, nix::sys::termios::SetArg::TCSANOW, termios);
        }
        let _ = console::Term::stderr().show_cursor();
    }
}
