//! A remote shell.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::client::Client;
use super::command::Command;
use super::direct::DirectCommand;
use super::SessionState;
use crate::error::{Error, Result};
use crate::protocol::{delete_shell_request, execute_command_request, parse_execute_command_response};

/// A shell opened on the remote host.
///
/// Clones refer to the same remote shell. The id is cleared once the service
/// has deleted the shell; later closes do nothing. A failed close keeps the
/// id so it can be retried.
#[derive(Clone)]
pub struct Shell {
    inner: Arc<ShellInner>,
}

struct ShellInner {
    client: Client,
    id: Mutex<String>,
    // serializes closes so the shell is deleted once
    closing: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell").field("id", &self.id()).finish()
    }
}

impl Shell {
    pub(crate) fn new(client: Client, id: String) -> Self {
        Self {
            inner: Arc::new(ShellInner {
                client,
                id: Mutex::new(id),
                closing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Shell id, empty once closed
    pub fn id(&self) -> String {
        self.inner.id.lock().clone()
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn is_open(&self) -> bool {
        !self.inner.id.lock().is_empty()
    }

    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::ShellClosed
        }
    }

    /// Run `command` and stream its output.
    pub async fn execute(&self, command: &str) -> Result<Command> {
        self.execute_with_args::<&str>(command, &[]).await
    }

    /// Run `command` with `arguments`, each sent as its own argument element.
    ///
    /// ExecuteCommand is never retried here. Retrying is only safe for the
    /// caller when this returned an error.
    pub async fn execute_with_args<S: AsRef<str>>(
        &self,
        command: &str,
        arguments: &[S],
    ) -> Result<Command> {
        let (shell_id, command_id) = self.start(command, arguments).await?;
        Ok(Command::start(self.clone(), shell_id, command_id))
    }

    /// Run `command` without background tasks; the caller drives input and
    /// output through the returned [`DirectCommand`].
    pub async fn execute_direct<S: AsRef<str>>(
        &self,
        command: &str,
        arguments: &[S],
    ) -> Result<DirectCommand> {
        let (shell_id, command_id) = self.start(command, arguments).await?;
        Ok(DirectCommand::new(self.clone(), shell_id, command_id))
    }

    async fn start<S: AsRef<str>>(&self, command: &str, arguments: &[S]) -> Result<(String, String)> {
        let shell_id = self.id();
        if shell_id.is_empty() {
            return Err(Error::InvalidConfig("shell is not open".to_string()));
        }

        let client = self.client();
        let request = execute_command_request(
            client.url(),
            &shell_id,
            command,
            arguments,
            client.parameters(),
        );
        let response = client.send(&request).await?;
        let command_id = parse_execute_command_response(&response)?;
        debug!(shell_id = %shell_id, command_id = %command_id, "started command");
        Ok((shell_id, command_id))
    }

    /// Delete the remote shell.
    pub async fn close(&self) -> Result<()> {
        let _closing = self.inner.closing.lock().await;
        let shell_id = self.id();
        if shell_id.is_empty() {
            return Ok(());
        }

        let client = self.client();
        let request = delete_shell_request(client.url(), &shell_id, client.parameters());
        client.send(&request).await?;
        self.inner.id.lock().clear();
        info!(shell_id = %shell_id, "closed remote shell");
        Ok(())
    }
}
