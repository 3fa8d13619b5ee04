//! Streamed command execution.
//!
//! A [`Command`] owns two background tasks:
//!
//! - the receive task polls `Receive` until the service reports Done and
//!   demultiplexes stdout/stderr into the readers returned by
//!   [`Command::take_stdout`] and [`Command::take_stderr`]
//! - the stdin task turns writes to [`CommandStdin`] into `Send` requests
//!
//! Both stop when the command finishes, is closed, or is dropped. A request
//! already sent is always completed first.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::client::Client;
use super::shell::Shell;
use super::SessionState;
use crate::error::{Error, Result};
use crate::protocol::{
    parse_slurp_output_err_response, receive_request, send_input_request, signal_request,
};

/// Exit code recorded when the receive loop failed without a sentinel code.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// Streams polled by the receive loop
const DESIRED_STREAMS: &str = "stdout stderr";

type Chunk = io::Result<Bytes>;

/// Output of a running command, readable with `tokio::io::AsyncReadExt`.
pub type OutputReader = StreamReader<UnboundedReceiverStream<Chunk>, Bytes>;

#[derive(Debug)]
struct Status {
    state: SessionState,
    finished: bool,
    exit_code: i32,
    error: Option<Error>,
}

impl Status {
    fn set_state(&mut self, state: SessionState) {
        trace!(from = %self.state, to = %state, "command state change");
        self.state = state;
    }
}

enum Input {
    Data(Bytes),
    Eof,
}

/// Standard input of a running command.
///
/// Each write becomes one `Send` request. Shutting the writer down sends
/// the end-of-input marker; dropping it without shutdown leaves the remote
/// input open.
#[derive(Debug)]
pub struct CommandStdin {
    tx: Option<mpsc::UnboundedSender<Input>>,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::Data(data) => write!(f, "Data({} bytes)", data.len()),
            Input::Eof => write!(f, "Eof"),
        }
    }
}

fn input_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "command input is closed")
}

impl AsyncWrite for CommandStdin {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let Some(tx) = self.tx.as_ref() else {
            return Poll::Ready(Err(input_closed()));
        };
        match tx.send(Input::Data(Bytes::copy_from_slice(buf))) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(input_closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(tx) = self.tx.take() {
            // the task may already be gone if the command finished
            let _ = tx.send(Input::Eof);
        }
        Poll::Ready(Ok(()))
    }
}

/// A command running in a remote shell.
pub struct Command {
    shell: Shell,
    shell_id: String,
    id: String,
    status: Arc<Mutex<Status>>,
    stdin: Option<CommandStdin>,
    stdout: Option<OutputReader>,
    stderr: Option<OutputReader>,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("shell_id", &self.shell_id)
            .field("id", &self.id)
            .field("status", &*self.status.lock())
            .finish()
    }
}

impl Command {
    /// Start the receive and stdin tasks for command `id`.
    pub(crate) fn start(shell: Shell, shell_id: String, id: String) -> Self {
        let status = Arc::new(Mutex::new(Status {
            state: SessionState::CommandRunning,
            finished: false,
            exit_code: 0,
            error: None,
        }));
        let cancel = CancellationToken::new();
        let (done_tx, done) = watch::channel(false);
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();

        let pump = ReceivePump {
            client: shell.client().clone(),
            shell_id: shell_id.clone(),
            command_id: id.clone(),
            status: status.clone(),
            stdout: stdout_tx,
            stderr: stderr_tx,
            cancel: cancel.clone(),
            done: done_tx,
        };
        tokio::spawn(pump.run());

        let feeder = InputFeeder {
            client: shell.client().clone(),
            shell_id: shell_id.clone(),
            command_id: id.clone(),
            input: stdin_rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(feeder.run());

        Self {
            shell,
            shell_id,
            id,
            status,
            stdin: Some(CommandStdin { tx: Some(stdin_tx) }),
            stdout: Some(StreamReader::new(UnboundedReceiverStream::new(stdout_rx))),
            stderr: Some(StreamReader::new(UnboundedReceiverStream::new(stderr_rx))),
            cancel,
            done,
            closed: AtomicBool::new(false),
        }
    }

    /// Command id assigned by the service
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Take the stdin writer. Returns `None` after the first call.
    pub fn take_stdin(&mut self) -> Option<CommandStdin> {
        self.stdin.take()
    }

    /// Take the stdout reader. Returns `None` after the first call.
    pub fn take_stdout(&mut self) -> Option<OutputReader> {
        self.stdout.take()
    }

    /// Take the stderr reader. Returns `None` after the first call.
    pub fn take_stderr(&mut self) -> Option<OutputReader> {
        self.stderr.take()
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().state
    }

    /// Whether the service reported the command as done.
    pub fn is_finished(&self) -> bool {
        self.status.lock().finished
    }

    /// Exit code. Meaningful once [`is_finished`](Self::is_finished) or
    /// when [`error`](Self::error) is set.
    pub fn exit_code(&self) -> i32 {
        self.status.lock().exit_code
    }

    /// Error that ended the receive loop, if any.
    pub fn error(&self) -> Option<Error> {
        self.status.lock().error.clone()
    }

    /// Wait until the receive loop has ended.
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // a dropped sender also means the loop is gone
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Stop polling, signal the command and close its shell.
    ///
    /// A failed signal is only logged; a failed shell deletion is returned
    /// and the close can be retried. Once closed, closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();

        if self.state() != SessionState::Signaled {
            let client = self.shell.client();
            let request =
                signal_request(client.url(), &self.shell_id, &self.id, client.parameters());
            match client.send(&request).await {
                Ok(_) => {
                    debug!(command_id = %self.id, "signaled command");
                    self.status.lock().set_state(SessionState::Signaled);
                }
                Err(e) => warn!(command_id = %self.id, error = %e, "failed to signal command"),
            }
        }

        self.shell.close().await?;
        self.closed.store(true, Ordering::SeqCst);
        self.status.lock().set_state(SessionState::ShellClosed);
        Ok(())
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Copy everything from `reader` into `writer`.
pub(crate) async fn drain<W>(reader: Option<OutputReader>, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let Some(mut reader) = reader else {
        return Ok(0);
    };
    let copied = tokio::io::copy(&mut reader, writer).await?;
    writer.flush().await?;
    Ok(copied)
}

// ============================================================================
// Background tasks
// ============================================================================

struct ReceivePump {
    client: Client,
    shell_id: String,
    command_id: String,
    status: Arc<Mutex<Status>>,
    stdout: mpsc::UnboundedSender<Chunk>,
    stderr: mpsc::UnboundedSender<Chunk>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

enum Step {
    Continue,
    Finished(i32),
    Failed(Error),
}

impl ReceivePump {
    async fn run(self) {
        self.status.lock().set_state(SessionState::Receiving);

        loop {
            // checked between round trips only; a Receive already on the
            // wire is always read to the end
            if self.cancel.is_cancelled() {
                debug!(command_id = %self.command_id, "receive loop cancelled");
                break;
            }

            let step = self.receive().await;
            match step {
                Step::Continue => {}
                Step::Finished(exit_code) => {
                    let mut status = self.status.lock();
                    status.finished = true;
                    status.exit_code = exit_code;
                    debug!(command_id = %self.command_id, exit_code, "command finished");
                    break;
                }
                Step::Failed(error) => {
                    let mut status = self.status.lock();
                    status.exit_code = error.sentinel_exit_code().unwrap_or(EXIT_CODE_UNKNOWN);
                    debug!(command_id = %self.command_id, error = %error, "receive loop failed");
                    status.error = Some(error);
                    break;
                }
            }
        }

        {
            let mut status = self.status.lock();
            if !status.state.is_terminal() {
                status.set_state(SessionState::CommandFinished);
            }
        }
        // stops the stdin task too
        self.cancel.cancel();
        let _ = self.done.send(true);
    }

    /// One Receive round trip.
    async fn receive(&self) -> Step {
        let params = self.client.parameters();
        let request = receive_request(
            self.client.url(),
            &self.shell_id,
            &self.command_id,
            DESIRED_STREAMS,
            params,
        );

        let response = match self.client.send(&request).await {
            Ok(response) => response,
            Err(e) if e.is_operation_timeout() => {
                trace!(command_id = %self.command_id, "no output yet, polling again");
                tokio::task::yield_now().await;
                return Step::Continue;
            }
            Err(e @ (Error::Transport(_) | Error::Timeout(_))) if params.allow_timeout => {
                warn!(
                    command_id = %self.command_id,
                    error = %e,
                    "connection lost while polling output, treating the command as finished"
                );
                return Step::Finished(0);
            }
            Err(e) => return Step::Failed(e),
        };

        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = match parse_slurp_output_err_response(&response, &mut out, &mut err) {
            Ok(outcome) => outcome,
            Err(e) => return Step::Failed(e),
        };

        // a reader that went away only loses its own stream
        if !out.is_empty() {
            let _ = self.stdout.send(Ok(Bytes::from(out)));
        }
        if !err.is_empty() {
            let _ = self.stderr.send(Ok(Bytes::from(err)));
        }

        if outcome.finished {
            Step::Finished(outcome.exit_code_or_default())
        } else {
            Step::Continue
        }
    }
}

struct InputFeeder {
    client: Client,
    shell_id: String,
    command_id: String,
    input: mpsc::UnboundedReceiver<Input>,
    cancel: CancellationToken,
}

impl InputFeeder {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = self.input.recv() => input,
            };
            let (data, eof) = match input {
                Some(Input::Data(data)) => (data, false),
                Some(Input::Eof) => (Bytes::new(), true),
                None => break,
            };

            let request = send_input_request(
                self.client.url(),
                &self.shell_id,
                &self.command_id,
                &data,
                eof,
                self.client.parameters(),
            );
            if let Err(e) = self.client.send(&request).await {
                warn!(command_id = %self.command_id, error = %e, "failed to send input");
                break;
            }
            trace!(command_id = %self.command_id, len = data.len(), eof, "sent input");
            if eof {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::client::testing::*;
    use super::*;
    use crate::config::{AuthMethod, Credentials, Endpoint, Parameters};
    use crate::soap::SoapMessage;
    use crate::transport::{PostContext, TransportDecorator, Transporter};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use crate::error::{EXIT_CODE_CONNECTION_LOST, EXIT_CODE_OPERATION_TIMEOUT};
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    async fn read_all(reader: Option<OutputReader>) -> String {
        let mut text = String::new();
        reader.unwrap().read_to_string(&mut text).await.unwrap();
        text
    }

    fn actions(requests: &Arc<Mutex<Vec<String>>>) -> Vec<&'static str> {
        requests.lock().iter().map(|r| action_of(r)).collect()
    }

    #[tokio::test]
    async fn test_execute_streams_output_until_done() {
        let receives = Arc::new(Mutex::new(0));
        let counter = receives.clone();
        let (client, requests) = scripted_client(Parameters::default(), move |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Receive" => {
                    let mut count = counter.lock();
                    *count += 1;
                    if *count == 1 {
                        receive_response(
                            "That's all folks!!!",
                            "This is stderr, I'm pretty sure!",
                            None,
                        )
                    } else {
                        receive_response("", "", Some(0))
                    }
                }
                _ => empty_response(),
            })
        });

        let shell = client.create_shell().await.unwrap();
        assert_eq!(shell.id(), SHELL_ID);
        let mut cmd = shell.execute("ipconfig /all").await.unwrap();
        assert_eq!(cmd.id(), COMMAND_ID);

        let (stdout, stderr) = tokio::join!(read_all(cmd.take_stdout()), read_all(cmd.take_stderr()));
        cmd.wait().await;
        assert_eq!(stdout, "That's all folks!!!");
        assert_eq!(stderr, "This is stderr, I'm pretty sure!");
        assert!(cmd.is_finished());
        assert_eq!(cmd.exit_code(), 0);
        assert_eq!(cmd.state(), SessionState::CommandFinished);

        cmd.close().await.unwrap();
        assert_eq!(cmd.state(), SessionState::ShellClosed);
        assert_eq!(
            actions(&requests),
            ["Create", "Command", "Receive", "Receive", "Signal", "Delete"]
        );
        assert_eq!(*receives.lock(), 2);

        // second close does nothing
        cmd.close().await.unwrap();
        assert_eq!(requests.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_execute_with_arguments() {
        let (client, requests) = scripted_client(Parameters::default(), |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Receive" => receive_response("", "", Some(7)),
                _ => empty_response(),
            })
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute_with_args("cmd", &["/c", "exit 7"]).await.unwrap();
        cmd.wait().await;
        assert_eq!(cmd.exit_code(), 7);

        let command = requests.lock()[1].clone();
        assert!(command.contains(r#"<rsp:Command>"cmd"</rsp:Command>"#));
        assert!(command.contains("<rsp:Arguments>/c</rsp:Arguments>"));
        assert!(command.contains("<rsp:Arguments>exit 7</rsp:Arguments>"));
    }

    #[tokio::test]
    async fn test_operation_timeout_is_retried() {
        let (client, requests) = scripted_client(Parameters::default(), |index, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                // requests 2 and 3 time out on the server side
                "Receive" if index < 4 => Err(timeout_fault()),
                "Receive" => Ok(receive_response("late", "", Some(3))),
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let mut cmd = shell.execute("slow").await.unwrap();
        let stdout = read_all(cmd.take_stdout()).await;
        cmd.wait().await;

        assert_eq!(stdout, "late");
        assert_eq!(cmd.exit_code(), 3);
        assert!(cmd.error().is_none());
        assert_eq!(actions(&requests).iter().filter(|a| **a == "Receive").count(), 3);
    }

    #[tokio::test]
    async fn test_connection_loss_records_sentinel() {
        let (client, _) = scripted_client(Parameters::default(), |_, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" => Err(Error::Transport("Test /wsman: EOF".into())),
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("shutdown /r").await.unwrap();
        cmd.wait().await;

        assert!(!cmd.is_finished());
        assert!(matches!(cmd.error(), Some(Error::Transport(_))));
        assert_eq!(cmd.exit_code(), EXIT_CODE_CONNECTION_LOST);
        assert_eq!(client.exit_code(Some(&cmd)), EXIT_CODE_CONNECTION_LOST);
        assert!(matches!(client.error(Some(&cmd)), Some(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_timeout_records_sentinel() {
        let (client, _) = scripted_client(Parameters::default(), |_, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" => Err(Error::Timeout("deadline has elapsed".into())),
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("ping -t localhost").await.unwrap();
        cmd.wait().await;
        assert_eq!(cmd.exit_code(), EXIT_CODE_OPERATION_TIMEOUT);
    }

    #[tokio::test]
    async fn test_allow_timeout_ends_stream() {
        let params = Parameters::default().with_allow_timeout(true);
        let (client, _) = scripted_client(params, |index, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" if index == 2 => Ok(receive_response("rebooting", "", None)),
                "Receive" => Err(Error::Transport("connection reset".into())),
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let mut cmd = shell.execute("shutdown /r /t 0").await.unwrap();
        let stdout = read_all(cmd.take_stdout()).await;
        cmd.wait().await;

        assert_eq!(stdout, "rebooting");
        assert!(cmd.is_finished());
        assert!(cmd.error().is_none());
        assert_eq!(cmd.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_is_fatal() {
        let (client, requests) = scripted_client(Parameters::default(), |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Receive" => "<broken".to_string(),
                _ => empty_response(),
            })
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("dir").await.unwrap();
        cmd.wait().await;

        assert!(matches!(cmd.error(), Some(Error::Parse(_))));
        assert_eq!(cmd.exit_code(), EXIT_CODE_UNKNOWN);
        assert_eq!(actions(&requests).iter().filter(|a| **a == "Receive").count(), 1);
    }

    #[tokio::test]
    async fn test_signal_failure_still_closes_shell() {
        let (client, requests) = scripted_client(Parameters::default(), |_, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" => Ok(receive_response("", "", Some(0))),
                "Signal" => Err(Error::HttpStatus {
                    status: 500,
                    reason: "Internal Server Error".into(),
                    body: String::new(),
                }),
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("dir").await.unwrap();
        cmd.wait().await;
        cmd.close().await.unwrap();

        assert!(!shell.is_open());
        assert_eq!(actions(&requests).last(), Some(&"Delete"));
    }

    /// Holds every Receive open for a while and counts the ones answered.
    struct SlowReceive {
        requests: Arc<Mutex<Vec<String>>>,
        answered: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Transporter for SlowReceive {
        fn configure(&mut self, _endpoint: &Endpoint, _params: &Parameters) -> Result<()> {
            Ok(())
        }

        async fn post(&self, _ctx: &PostContext, request: &SoapMessage) -> Result<String> {
            let xml = request.to_xml();
            self.requests.lock().push(xml.clone());
            match action_of(&xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    self.answered.fetch_add(1, Ordering::SeqCst);
                    Ok(receive_response("tick", "", None))
                }
                _ => Ok(empty_response()),
            }
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_close_lets_receive_in_flight_finish() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let answered = Arc::new(AtomicUsize::new(0));
        let (recorded, counter) = (requests.clone(), answered.clone());
        let decorator: TransportDecorator = Arc::new(move || -> Box<dyn Transporter> {
            Box::new(SlowReceive {
                requests: recorded.clone(),
                answered: counter.clone(),
            })
        });
        let client = Client::with_parameters(
            &Endpoint::new("localhost"),
            Credentials::new("Administrator", "v3r1S3cre7"),
            AuthMethod::Basic,
            Parameters::default().with_transport_decorator(decorator),
        )
        .unwrap();

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("ping -t localhost").await.unwrap();
        while !actions(&requests).contains(&"Receive") {
            tokio::task::yield_now().await;
        }

        cmd.close().await.unwrap();
        cmd.wait().await;

        assert_eq!(answered.load(Ordering::SeqCst), 1);
        assert_eq!(actions(&requests).iter().filter(|a| **a == "Receive").count(), 1);
        assert_eq!(cmd.state(), SessionState::ShellClosed);
        assert!(cmd.error().is_none());
    }

    #[tokio::test]
    async fn test_close_retries_after_failed_delete() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let counter = deletes.clone();
        let (client, requests) = scripted_client(Parameters::default(), move |_, xml| {
            match action_of(xml) {
                "Create" => Ok(create_response()),
                "Command" => Ok(command_response()),
                "Receive" => Ok(receive_response("", "", Some(0))),
                "Delete" if counter.fetch_add(1, Ordering::SeqCst) == 0 => {
                    Err(Error::Transport("connection reset by peer".into()))
                }
                _ => Ok(empty_response()),
            }
        });

        let shell = client.create_shell().await.unwrap();
        let cmd = shell.execute("dir").await.unwrap();
        cmd.wait().await;

        assert!(cmd.close().await.is_err());
        assert!(shell.is_open());
        cmd.close().await.unwrap();
        assert!(!shell.is_open());
        assert_eq!(cmd.state(), SessionState::ShellClosed);

        // the command was signaled once, the shell deleted on the retry
        assert_eq!(
            actions(&requests),
            ["Create", "Command", "Receive", "Signal", "Delete", "Delete"]
        );
        cmd.close().await.unwrap();
        assert_eq!(requests.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let (client, _) = scripted_client(Parameters::default(), |_, xml| {
            Ok(match action_of(xml) {
                "Create" => create_response(),
                "Command" => command_response(),
                "Receive" => receive_response("", "", Some(0)),
                _ => empty_response(),
            })
        });

        let shell = client.create_shell().await.unwrap();
        let mut cmd = shell.execute("dir").await.unwrap();
        let mut stdin = cmd.take_stdin().unwrap();
        cmd.wait().await;
        stdin.shutdown().await.unwrap();
        let err = stdin.write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
