//! Remote shell sessions.
//!
//! A [`Client`] opens [`Shell`]s; a shell runs [`Command`]s (streamed, with
//! background receive and stdin tasks) or [`DirectCommand`]s (driven one
//! request at a time by the caller).
//!
//! ```text
//! Unopened -> Open -> CommandRunning -> Receiving -> CommandFinished
//!                                                        |
//!                                     ShellClosed <- Signaled
//! ```

pub mod client;
pub mod command;
pub mod direct;
pub mod shell;

use std::fmt;

pub use client::Client;
pub use command::{Command, CommandStdin, OutputReader};
pub use direct::{DirectCommand, DirectOutput};
pub use shell::Shell;

/// Where a command and its shell are in their lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No shell has been created yet
    Unopened,
    /// The shell exists and can run commands
    Open,
    /// ExecuteCommand succeeded, output not polled yet
    CommandRunning,
    /// The receive loop is polling for output
    Receiving,
    /// The service reported `CommandState/Done`, or the loop ended
    CommandFinished,
    /// The terminate signal was sent
    Signaled,
    /// The shell was deleted
    ShellClosed,
}

impl SessionState {
    /// Whether the receive loop can no longer produce output.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::CommandFinished | SessionState::Signaled | SessionState::ShellClosed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unopened => "unopened",
            SessionState::Open => "open",
            SessionState::CommandRunning => "command running",
            SessionState::Receiving => "receiving",
            SessionState::CommandFinished => "command finished",
            SessionState::Signaled => "signaled",
            SessionState::ShellClosed => "shell closed",
        };
        write!(f, "{}", name)
    }
}
