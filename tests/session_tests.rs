//! Session lifecycle tests
//!
//! These drive the public client API against a scripted WinRM service that
//! sits behind the transport seam, so every request the session layer issues
//! can be inspected in order.

mod common;

use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use winrs::config::Parameters;
use winrs::error::{EXIT_CODE_CONNECTION_LOST, EXIT_CODE_OPERATION_TIMEOUT};
use winrs::session::SessionState;
use winrs::Error;

const IPCONFIG_PART_1: &str = "\r\nWindows IP Configuration\r\n\r\n   Host Name . . . . . . . . . . . . : win01\r\n";
const IPCONFIG_PART_2: &str = "   Primary Dns Suffix  . . . . . . . : example.com\r\n";

// ============================================================================
// Full command lifecycle
// ============================================================================

#[tokio::test]
async fn test_ipconfig_end_to_end() {
    let service = FakeService::with_receives([
        ReceiveReply::Output(output_response(IPCONFIG_PART_1, "", None)),
        ReceiveReply::Output(output_response(IPCONFIG_PART_2, "", Some(0))),
    ]);
    let client = client_for(&service, Parameters::default());

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = client
        .run("ipconfig /all", &mut stdout, &mut stderr)
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(
        String::from_utf8(stdout).unwrap(),
        format!("{}{}", IPCONFIG_PART_1, IPCONFIG_PART_2)
    );
    assert!(stderr.is_empty());
    assert_eq!(
        service.actions(),
        vec!["Create", "Command", "Receive", "Receive", "Signal", "Delete"]
    );

    let command = &service.requests_for("Command")[0];
    assert!(command.contains("\"ipconfig /all\""));
    assert!(command.contains(SHELL_ID));
    let signal = &service.requests_for("Signal")[0];
    assert!(signal.contains(COMMAND_ID));
    assert!(signal.contains("signal/terminate"));
}

#[tokio::test]
async fn test_manual_shell_and_command() {
    let service = FakeService::with_receives([ReceiveReply::Output(output_response(
        "out",
        "err",
        Some(7),
    ))]);
    let client = client_for(&service, Parameters::default());

    let shell = client.create_shell().await.unwrap();
    assert_eq!(shell.id(), SHELL_ID);
    assert_eq!(shell.state(), SessionState::Open);

    let mut cmd = shell.execute_with_args("cmd", &["/c", "exit 7"]).await.unwrap();
    assert_eq!(cmd.id(), COMMAND_ID);

    let mut stdout = cmd.take_stdout().unwrap();
    let mut stderr = cmd.take_stderr().unwrap();
    let mut out = String::new();
    let mut err = String::new();
    stdout.read_to_string(&mut out).await.unwrap();
    stderr.read_to_string(&mut err).await.unwrap();
    cmd.wait().await;

    assert_eq!(out, "out");
    assert_eq!(err, "err");
    assert!(cmd.is_finished());
    assert_eq!(cmd.exit_code(), 7);
    assert_eq!(cmd.state(), SessionState::CommandFinished);

    cmd.close().await.unwrap();
    assert_eq!(cmd.state(), SessionState::ShellClosed);
    assert!(!shell.is_open());
    assert_eq!(shell.state(), SessionState::ShellClosed);

    // Closing twice sends nothing new.
    cmd.close().await.unwrap();
    assert_eq!(service.requests_for("Delete").len(), 1);
}

#[tokio::test]
async fn test_operation_timeouts_keep_polling() {
    let service = FakeService::with_receives([
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Output(output_response("late output", "", Some(2))),
    ]);
    let client = client_for(&service, Parameters::default());

    let (stdout, stderr, code) = client.run_with_string("slow.exe", "").await.unwrap();

    assert_eq!(stdout, "late output");
    assert_eq!(stderr, "");
    assert_eq!(code, 2);
    assert_eq!(service.requests_for("Receive").len(), 3);
    assert!(client.last_error().is_none());
}

#[tokio::test]
async fn test_missing_exit_code_reads_as_zero() {
    let body = format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell"><s:Body><rsp:ReceiveResponse><rsp:CommandState CommandId="{COMMAND_ID}" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done"/></rsp:ReceiveResponse></s:Body></s:Envelope>"#
    );
    let service = FakeService::with_receives([ReceiveReply::Output(body)]);
    let client = client_for(&service, Parameters::default());

    let (_, _, code) = client.run_with_string("exit", "").await.unwrap();
    assert_eq!(code, 0);
}

// ============================================================================
// Standard input
// ============================================================================

#[tokio::test]
async fn test_stdin_is_sent_and_closed() {
    // Early polls time out so the feeder runs before the command ends.
    let service = FakeService::with_receives([
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Output(output_response("hello", "", Some(0))),
    ]);
    let client = client_for(&service, Parameters::default());

    let shell = client.create_shell().await.unwrap();
    let mut cmd = shell.execute("findstr .*").await.unwrap();
    let mut stdin = cmd.take_stdin().unwrap();
    stdin.write_all(b"hello").await.unwrap();
    stdin.shutdown().await.unwrap();

    let mut out = String::new();
    cmd.take_stdout().unwrap().read_to_string(&mut out).await.unwrap();
    cmd.wait().await;
    cmd.close().await.unwrap();

    assert_eq!(out, "hello");
    let sends = service.requests_for("Send");
    assert_eq!(sends.len(), 2);
    assert!(sends[0].contains("aGVsbG8="));
    assert!(!sends[0].contains("End=\"true\""));
    assert!(sends[1].contains("End=\"true\""));
}

#[tokio::test]
async fn test_run_with_input_forwards_reader() {
    let service = FakeService::with_receives([
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Output(output_response("done", "", Some(0))),
    ]);
    let client = client_for(&service, Parameters::default());

    let mut input: &[u8] = b"line one\r\n";
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = client
        .run_with_input("more", &mut stdout, &mut stderr, &mut input)
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(stdout, b"done");
    let sends = service.requests_for("Send");
    assert!(!sends.is_empty());
    // "line one\r\n"
    assert!(sends[0].contains("bGluZSBvbmUNCg=="));
}

// ============================================================================
// Failures and classification
// ============================================================================

#[tokio::test]
async fn test_connection_lost_while_polling() {
    let service = FakeService::with_receives([
        ReceiveReply::Output(output_response("partial", "", None)),
        ReceiveReply::Fail(Error::Transport("connection reset by peer".into())),
    ]);
    let client = client_for(&service, Parameters::default());

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let result = client.run("shutdown /r /t 0", &mut stdout, &mut stderr).await;

    let error = result.unwrap_err();
    assert_eq!(error.sentinel_exit_code(), Some(EXIT_CODE_CONNECTION_LOST));
    assert_eq!(stdout, b"partial");
    assert_eq!(
        client.error(None).unwrap().to_string(),
        "A connection terminated unexpectedly, error while sending request to endpoint: connection reset by peer"
    );
    assert_eq!(client.exit_code(None), EXIT_CODE_CONNECTION_LOST);
    // The shell is still torn down.
    assert_eq!(service.actions().last(), Some(&"Delete"));
}

#[tokio::test]
async fn test_http_timeout_while_polling() {
    let service = FakeService::with_receives([ReceiveReply::Fail(Error::Timeout(
        "operation timed out".into(),
    ))]);
    let client = client_for(&service, Parameters::default());

    let result = client.run_with_string("ping -n 600 localhost", "").await;

    assert_eq!(
        result.unwrap_err().sentinel_exit_code(),
        Some(EXIT_CODE_OPERATION_TIMEOUT)
    );
    assert!(matches!(client.error(None), Some(Error::OperationTimeout(_))));
    assert_eq!(client.exit_code(None), EXIT_CODE_OPERATION_TIMEOUT);
}

#[tokio::test]
async fn test_allow_timeout_treats_drop_as_completion() {
    let service = FakeService::with_receives([
        ReceiveReply::Output(output_response("rebooting", "", None)),
        ReceiveReply::Fail(Error::Transport("connection reset by peer".into())),
    ]);
    let client = client_for(&service, Parameters::default().with_allow_timeout(true));

    let (stdout, _, code) = client.run_with_string("shutdown /r /t 0", "").await.unwrap();

    assert_eq!(stdout, "rebooting");
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_execute_on_closed_shell() {
    let service = FakeService::with_receives([]);
    let client = client_for(&service, Parameters::default());
    let shell = client.create_shell().await.unwrap();
    shell.close().await.unwrap();

    let error = shell.execute("dir").await.unwrap_err();
    assert!(matches!(error, Error::InvalidConfig(_)));
    assert_eq!(service.actions(), vec!["Create", "Delete"]);
}

#[tokio::test]
async fn test_clear_error_resets_classification() {
    let service = FakeService::with_receives([ReceiveReply::Fail(Error::Transport(
        "broken pipe".into(),
    ))]);
    let client = client_for(&service, Parameters::default());

    let _ = tokio::time::timeout(
        Duration::from_secs(5),
        client.run_with_string("hostname", ""),
    )
    .await
    .expect("run finishes");

    assert!(client.last_error().is_some());
    client.clear_error();
    assert!(client.error(None).is_none());
    assert_eq!(client.exit_code(None), 0);
}

// ============================================================================
// Direct command I/O
// ============================================================================

#[tokio::test]
async fn test_direct_command_conversation() {
    let service = FakeService::with_receives([
        ReceiveReply::Output(output_response("C:\\>", "", None)),
        ReceiveReply::Fail(operation_timeout_error()),
        ReceiveReply::Output(output_response("hello\r\n", "", Some(0))),
    ]);
    let client = client_for(&service, Parameters::default());
    let shell = client.create_shell().await.unwrap();
    let direct = shell.execute_direct("cmd", &["/q"]).await.unwrap();

    let prompt = direct.read_output().await.unwrap();
    assert_eq!(prompt.stdout, b"C:\\>");
    assert!(!prompt.finished);

    direct.send_command("echo hello").await.unwrap();
    let idle = direct.read_output().await.unwrap();
    assert!(idle.stdout.is_empty());
    assert!(!idle.finished);

    let last = direct.read_output().await.unwrap();
    assert_eq!(last.stdout, b"hello\r\n");
    assert!(last.finished);
    assert_eq!(last.exit_code, 0);

    direct.close().await.unwrap();
    assert_eq!(
        service.actions(),
        vec!["Create", "Command", "Receive", "Send", "Receive", "Receive", "Signal", "Delete"]
    );
    // "echo hello\n"
    assert!(service.requests_for("Send")[0].contains("ZWNobyBoZWxsbwo="));
}
