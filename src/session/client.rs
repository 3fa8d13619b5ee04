//! The WinRM client: a configured transport plus request parameters.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::command::{drain, Command};
use super::shell::Shell;
use crate::config::{AuthMethod, Credentials, Endpoint, Parameters, WinRmConfig};
use crate::error::{Error, Result, EXIT_CODE_CONNECTION_LOST, EXIT_CODE_OPERATION_TIMEOUT};
use crate::powershell;
use crate::protocol::{open_shell_request, parse_open_shell_response};
use crate::soap::SoapMessage;
use crate::transport::{new_transporter, PostContext, Transporter};

/// A WinRM client.
///
/// Creating a client does not connect; the first request does. Clones share
/// the transport, the parameters and the sticky error.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    context: PostContext,
    transport: Arc<dyn Transporter>,
    params: Arc<Parameters>,
    last_error: Mutex<Option<Error>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.context.url)
            .field("transport", &self.inner.transport.name())
            .field("params", &self.inner.params)
            .finish()
    }
}

impl Client {
    /// Create a client with default parameters.
    pub fn new(endpoint: &Endpoint, credentials: Credentials, auth: AuthMethod) -> Result<Self> {
        Self::with_parameters(endpoint, credentials, auth, Parameters::default())
    }

    /// Create a client with explicit parameters.
    ///
    /// A transport decorator in `params` replaces the transport that `auth`
    /// would select.
    pub fn with_parameters(
        endpoint: &Endpoint,
        credentials: Credentials,
        auth: AuthMethod,
        params: impl Into<Arc<Parameters>>,
    ) -> Result<Self> {
        let params = params.into();
        let mut transport = match &params.transport_decorator {
            Some(decorator) => decorator(),
            None => new_transporter(&auth, &credentials)?,
        };
        transport.configure(endpoint, &params)?;

        let url = endpoint.url();
        debug!(url = %url, transport = transport.name(), "created WinRM client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                context: PostContext { url, credentials },
                transport: Arc::from(transport),
                params,
                last_error: Mutex::new(None),
            }),
        })
    }

    /// Create a client from a loaded configuration file.
    pub fn from_config(config: &WinRmConfig) -> Result<Self> {
        Self::with_parameters(
            &config.endpoint()?,
            config.credentials(),
            config.auth.clone(),
            config.parameters(),
        )
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.inner.context.url
    }

    pub fn parameters(&self) -> &Parameters {
        &self.inner.params
    }

    /// Name of the transport in use
    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    /// Post a request, recording connection-level failures as the sticky error.
    pub(crate) async fn send(&self, request: &SoapMessage) -> Result<String> {
        let result = self.inner.transport.post(&self.inner.context, request).await;
        if let Err(e @ (Error::Transport(_) | Error::Timeout(_))) = &result {
            debug!(error = %e, "recording client error");
            *self.inner.last_error.lock() = Some(e.clone());
        }
        result
    }

    /// Last connection-level error seen by any request of this client.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.last_error.lock().clone()
    }

    /// Forget the sticky error.
    pub fn clear_error(&self) {
        self.inner.last_error.lock().take();
    }

    #[cfg(test)]
    pub(crate) fn set_last_error(&self, error: Error) {
        *self.inner.last_error.lock() = Some(error);
    }

    /// Open a new remote shell.
    pub async fn create_shell(&self) -> Result<Shell> {
        let request = open_shell_request(self.url(), self.parameters());
        let response = self.send(&request).await?;
        let shell_id = parse_open_shell_response(&response)?;
        info!(shell_id = %shell_id, "opened remote shell");
        Ok(Shell::new(self.clone(), shell_id))
    }

    /// The error to report for `command`.
    ///
    /// A command's own outcome wins; otherwise the sticky client error is
    /// classified as a lost connection or an operation timeout.
    pub fn error(&self, command: Option<&Command>) -> Option<Error> {
        if let Some(command) = command {
            if let Some(error) = command.error() {
                return Some(error);
            }
            if command.is_finished() {
                return None;
            }
        }
        self.last_error().map(classify)
    }

    /// The exit code to report for `command`, following [`error`](Self::error).
    pub fn exit_code(&self, command: Option<&Command>) -> i32 {
        if let Some(command) = command {
            if command.error().is_some() || command.is_finished() {
                return command.exit_code();
            }
        }
        match self.last_error().map(classify) {
            Some(Error::ConnectionLost(_)) => EXIT_CODE_CONNECTION_LOST,
            Some(Error::OperationTimeout(_)) => EXIT_CODE_OPERATION_TIMEOUT,
            _ => 0,
        }
    }

    // ------------------------------------------------------------------------
    // Run helpers
    // ------------------------------------------------------------------------

    /// Run `command`, copying its output to `stdout` and `stderr`.
    ///
    /// Returns the exit code. The shell is closed afterwards.
    pub async fn run<O, E>(&self, command: &str, stdout: &mut O, stderr: &mut E) -> Result<i32>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        let (_shell, mut cmd) = self.start(command).await?;

        let drained = tokio::try_join!(drain(cmd.take_stdout(), stdout), drain(cmd.take_stderr(), stderr));
        finish(cmd, drained.map(|_| ())).await
    }

    /// Run `command` with `stdin` as its input and collect its output.
    ///
    /// Returns `(stdout, stderr, exit_code)`.
    pub async fn run_with_string(
        &self,
        command: &str,
        stdin: &str,
    ) -> Result<(String, String, i32)> {
        let (_shell, mut cmd) = self.start(command).await?;

        if !stdin.is_empty() {
            if let Some(mut input) = cmd.take_stdin() {
                input.write_all(stdin.as_bytes()).await?;
                input.shutdown().await?;
            }
        }

        let mut out = Vec::new();
        let mut err = Vec::new();
        let drained = tokio::try_join!(drain(cmd.take_stdout(), &mut out), drain(cmd.take_stderr(), &mut err));
        let code = finish(cmd, drained.map(|_| ())).await?;

        Ok((
            String::from_utf8_lossy(&out).into_owned(),
            String::from_utf8_lossy(&err).into_owned(),
            code,
        ))
    }

    /// Run `command`, feeding it `stdin` and copying its output.
    ///
    /// Every chunk read from `stdin` becomes a Send request, so a buffered
    /// reader is preferable for byte-at-a-time sources. Input still pending
    /// when the command finishes is dropped.
    pub async fn run_with_input<O, E, I>(
        &self,
        command: &str,
        stdout: &mut O,
        stderr: &mut E,
        stdin: &mut I,
    ) -> Result<i32>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
        I: AsyncRead + Unpin + ?Sized,
    {
        let (_shell, mut cmd) = self.start(command).await?;

        let mut input = cmd.take_stdin();
        let feed = async {
            if let Some(input) = input.as_mut() {
                tokio::io::copy(stdin, input).await?;
                input.shutdown().await?;
            }
            Ok::<_, Error>(())
        };
        let (out, err) = (cmd.take_stdout(), cmd.take_stderr());
        let output = async { tokio::try_join!(drain(out, stdout), drain(err, stderr)) };

        tokio::pin!(feed);
        tokio::pin!(output);
        let drained = tokio::select! {
            drained = &mut output => drained,
            fed = &mut feed => {
                if let Err(e) = fed {
                    warn!(error = %e, "failed to forward stdin");
                }
                (&mut output).await
            }
        };
        finish(cmd, drained.map(|_| ())).await
    }

    /// Run a PowerShell script through [`run_with_string`](Self::run_with_string).
    pub async fn run_ps_with_string(
        &self,
        script: &str,
        stdin: &str,
    ) -> Result<(String, String, i32)> {
        self.run_with_string(&powershell::encode(script), stdin).await
    }

    async fn start(&self, command: &str) -> Result<(Shell, Command)> {
        let shell = self.create_shell().await?;
        match shell.execute(command).await {
            Ok(cmd) => Ok((shell, cmd)),
            Err(e) => {
                if let Err(close) = shell.close().await {
                    warn!(error = %close, "failed to close shell after execute error");
                }
                Err(e)
            }
        }
    }
}

/// Wait for the command, close it with its shell and report the outcome.
async fn finish(cmd: Command, drained: Result<()>) -> Result<i32> {
    cmd.wait().await;
    let closed = cmd.close().await;

    if let Some(error) = cmd.error() {
        return Err(error);
    }
    drained?;
    closed?;
    Ok(cmd.exit_code())
}

/// Turn a sticky transport error into the error reported to callers.
fn classify(error: Error) -> Error {
    match error {
        Error::Timeout(message) => Error::OperationTimeout(message),
        e if e.is_operation_timeout() => Error::OperationTimeout(e.to_string()),
        e if e.is_connection_lost() => Error::ConnectionLost(e.to_string()),
        e => e,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use pretty_assertions::assert_eq;

    fn standard_script(_: usize, xml: &str) -> Result<String> {
        Ok(match action_of(xml) {
            "Create" => create_response(),
            "Command" => command_response(),
            "Receive" => receive_response("That's all folks!!!", "", Some(0)),
            _ => empty_response(),
        })
    }

    #[test]
    fn test_error_classification() {
        let (client, _) = scripted_client(Parameters::default(), standard_script);

        client.set_last_error(Error::Transport("Test /wsman: EOF".into()));
        assert_eq!(
            client.error(None).unwrap().to_string(),
            "A connection terminated unexpectedly, error while sending request to endpoint: Test /wsman: EOF"
        );
        assert_eq!(client.exit_code(None), EXIT_CODE_CONNECTION_LOST);

        client.set_last_error(Error::Timeout("Test OperationTimeout".into()));
        assert_eq!(
            client.error(None).unwrap().to_string(),
            "Operation timeout because there was no command output: Test OperationTimeout"
        );
        assert_eq!(client.exit_code(None), EXIT_CODE_OPERATION_TIMEOUT);

        client.clear_error();
        assert!(client.error(None).is_none());
        assert_eq!(client.exit_code(None), 0);
    }

    #[tokio::test]
    async fn test_command_result_wins_over_client_error() {
        let (client, _) = scripted_client(Parameters::default(), |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Receive" => receive_response("", "", Some(123)),
                _ => empty_response(),
            })
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("ipconfig /all").await.unwrap();
        cmd.wait().await;

        client.set_last_error(Error::Transport("Test /wsman: EOF".into()));
        assert!(client.error(Some(&cmd)).is_none());
        assert_eq!(client.exit_code(Some(&cmd)), 123);
        assert_eq!(client.exit_code(None), EXIT_CODE_CONNECTION_LOST);
    }

    #[tokio::test]
    async fn test_transport_error_is_sticky() {
        let (client, _) = scripted_client(Parameters::default(), |_, _| {
            Err(Error::Transport("connection refused".into()))
        });

        assert!(client.create_shell().await.is_err());
        assert!(matches!(client.last_error(), Some(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_parse_error_is_not_sticky() {
        let (client, _) = scripted_client(Parameters::default(), |_, _| Ok("<bad".to_string()));
        assert!(matches!(client.create_shell().await, Err(Error::Parse(_))));
        assert!(client.last_error().is_none());
    }

    #[tokio::test]
    async fn test_run_collects_output() {
        let (client, requests) = scripted_client(Parameters::default(), standard_script);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = client
            .run("ipconfig /all", &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(stdout).unwrap(), "That's all folks!!!");
        assert!(stderr.is_empty());

        let actions: Vec<_> = requests.lock().iter().map(|r| action_of(r)).collect();
        assert_eq!(actions, ["Create", "Command", "Receive", "Signal", "Delete"]);
    }

    #[tokio::test]
    async fn test_run_with_string_sends_input_and_eof() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let eof_seen = Arc::new(AtomicBool::new(false));
        let seen = eof_seen.clone();
        let (client, requests) = scripted_client(Parameters::default(), move |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Send" => {
                    if xml.contains(r#"End="true""#) {
                        seen.store(true, Ordering::SeqCst);
                    }
                    empty_response()
                }
                // keep polling until the end of input arrives
                "Receive" if !seen.load(Ordering::SeqCst) => return Err(timeout_fault()),
                "Receive" => receive_response("ok", "", Some(0)),
                _ => empty_response(),
            })
        });

        let (stdout, stderr, code) = client
            .run_with_string("findstr x", "standard input")
            .await
            .unwrap();
        assert_eq!((stdout.as_str(), stderr.as_str(), code), ("ok", "", 0));

        let requests = requests.lock();
        let sends: Vec<_> = requests.iter().filter(|r| action_of(r) == "Send").collect();
        assert_eq!(sends.len(), 2);
        // base64("standard input")
        assert!(sends[0].contains("c3RhbmRhcmQgaW5wdXQ="));
        assert!(!sends[0].contains("End="));
        assert!(sends[1].contains(r#"End="true""#));
    }

    #[tokio::test]
    async fn test_run_ps_with_string_encodes_script() {
        let (client, requests) = scripted_client(Parameters::default(), standard_script);
        client.run_ps_with_string("dir", "").await.unwrap();

        let requests = requests.lock();
        let command = requests.iter().find(|r| action_of(r) == "Command").unwrap();
        assert!(command.contains("powershell.exe -EncodedCommand "));
    }

    #[tokio::test]
    async fn test_execute_failure_closes_shell() {
        let (client, requests) = scripted_client(Parameters::default(), |_, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(empty_response()),
                _ => Ok(empty_response()),
            }
        });

        let err = client
            .run("bogus", &mut Vec::new(), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecuteCommand { .. }));
        let actions: Vec<_> = requests.lock().iter().map(|r| action_of(r)).collect();
        assert_eq!(actions, ["Create", "Command", "Delete"]);
    }
}
