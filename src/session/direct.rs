//! Commands driven request by request.

use tracing::{debug, trace, warn};

use super::shell::Shell;
use crate::error::Result;
use crate::protocol::{
    parse_slurp_output_err_response, receive_request, send_input_request, signal_request,
};

/// Output of one [`DirectCommand::read_output`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The command reported Done
    pub finished: bool,
    /// Exit code, meaningful when `finished`
    pub exit_code: i32,
}

/// A command with no background tasks. Every call is one request.
#[derive(Debug)]
pub struct DirectCommand {
    shell: Shell,
    shell_id: String,
    id: String,
}

impl DirectCommand {
    pub(crate) fn new(shell: Shell, shell_id: String, id: String) -> Self {
        Self { shell, shell_id, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send `data` to stdin, closing the input when `eof` is set.
    pub async fn send_input(&self, data: &[u8], eof: bool) -> Result<()> {
        let client = self.shell.client();
        let request = send_input_request(
            client.url(),
            &self.shell_id,
            &self.id,
            data,
            eof,
            client.parameters(),
        );
        client.send(&request).await?;
        trace!(command_id = %self.id, len = data.len(), eof, "sent input");
        Ok(())
    }

    /// Send `line` followed by a newline.
    pub async fn send_command(&self, line: &str) -> Result<()> {
        self.send_input(format!("{}\n", line).as_bytes(), false).await
    }

    /// Poll once for output.
    ///
    /// An OperationTimeout fault is not an error here: it is reported as an
    /// empty, unfinished read.
    pub async fn read_output(&self) -> Result<DirectOutput> {
        let client = self.shell.client();
        let request = receive_request(
            client.url(),
            &self.shell_id,
            &self.id,
            "stdout stderr",
            client.parameters(),
        );

        let response = match client.send(&request).await {
            Ok(response) => response,
            Err(e) if e.is_operation_timeout() => {
                trace!(command_id = %self.id, "no output within the operation timeout");
                return Ok(DirectOutput::default());
            }
            Err(e) => return Err(e),
        };

        let mut output = DirectOutput::default();
        let outcome =
            parse_slurp_output_err_response(&response, &mut output.stdout, &mut output.stderr)?;
        output.finished = outcome.finished;
        output.exit_code = outcome.exit_code_or_default();
        Ok(output)
    }

    /// Signal the command and close the shell.
    pub async fn close(&self) -> Result<()> {
        if self.shell.is_open() {
            let client = self.shell.client();
            let request = signal_request(client.url(), &self.shell_id, &self.id, client.parameters());
            match client.send(&request).await {
                Ok(_) => debug!(command_id = %self.id, "signaled command"),
                Err(e) => warn!(command_id = %self.id, error = %e, "failed to signal command"),
            }
        }
        self.shell.close().await
    }
}
