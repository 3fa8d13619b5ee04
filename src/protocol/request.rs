//! Factories for the six shell requests.
//!
//! Every factory is a pure function of its inputs plus a fresh message id.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::{
    ACTION_COMMAND, ACTION_CREATE, ACTION_DELETE, ACTION_RECEIVE, ACTION_SEND, ACTION_SIGNAL,
    RESOURCE_URI_CMD, SIGNAL_TERMINATE,
};
use crate::config::Parameters;
use crate::soap::namespace::NS_WIN_SHELL;
use crate::soap::{generate_message_id, HeaderBuilder, SoapMessage};

/// Header fields shared by every shell request.
fn default_header<'a>(
    message: &'a mut SoapMessage,
    url: &str,
    action: &str,
    params: &Parameters,
) -> HeaderBuilder<'a> {
    message
        .header()
        .to(url)
        .reply_to_anonymous()
        .max_envelope_size(params.envelope_size)
        .id(generate_message_id())
        .locale(params.locale.as_str())
        .timeout(params.timeout.as_str())
        .action(action)
        .resource_uri(RESOURCE_URI_CMD)
}

/// Create a cmd shell with the configured shell options.
pub fn open_shell_request(url: &str, params: &Parameters) -> SoapMessage {
    let mut message = SoapMessage::new();
    let mut header = default_header(&mut message, url, ACTION_CREATE, params);
    for (name, value) in &params.shell_options {
        header = header.add_option(name.as_str(), value.as_str());
    }
    header.build();

    let shell = message.create_body_element("Shell", NS_WIN_SHELL);
    let input = message.create_element(shell, "InputStreams", NS_WIN_SHELL);
    message.set_content(input, "stdin");
    let output = message.create_element(shell, "OutputStreams", NS_WIN_SHELL);
    message.set_content(output, "stdout stderr");

    message
}

/// Delete a shell.
pub fn delete_shell_request(url: &str, shell_id: &str, params: &Parameters) -> SoapMessage {
    let mut message = SoapMessage::new();
    default_header(&mut message, url, ACTION_DELETE, params)
        .shell_id(shell_id)
        .build();
    message
}

/// Start `command` with `arguments` inside a shell.
///
/// The command line is wrapped in double quotes. Only `&`, `<` and `>` are
/// entity-escaped on the wire.
pub fn execute_command_request<S: AsRef<str>>(
    url: &str,
    shell_id: &str,
    command: &str,
    arguments: &[S],
    params: &Parameters,
) -> SoapMessage {
    let mut message = SoapMessage::new();
    default_header(&mut message, url, ACTION_COMMAND, params)
        .shell_id(shell_id)
        .add_option("WINRS_CONSOLEMODE_STDIN", "FALSE")
        .build();

    let line = message.create_body_element("CommandLine", NS_WIN_SHELL);
    let cmd = message.create_element(line, "Command", NS_WIN_SHELL);
    message.set_content(cmd, format!("\"{}\"", command));
    for argument in arguments {
        let arg = message.create_element(line, "Arguments", NS_WIN_SHELL);
        message.set_content(arg, argument.as_ref());
    }

    message
}

/// Poll a command for output on `streams` (space separated).
pub fn receive_request(
    url: &str,
    shell_id: &str,
    command_id: &str,
    streams: &str,
    params: &Parameters,
) -> SoapMessage {
    let mut message = SoapMessage::new();
    default_header(&mut message, url, ACTION_RECEIVE, params)
        .shell_id(shell_id)
        .build();

    let receive = message.create_body_element("Receive", NS_WIN_SHELL);
    let desired = message.create_element(receive, "DesiredStream", NS_WIN_SHELL);
    message.set_attr(desired, "CommandId", command_id);
    message.set_content(desired, streams);

    message
}

/// Push `input` to a command's stdin, optionally closing it.
pub fn send_input_request(
    url: &str,
    shell_id: &str,
    command_id: &str,
    input: &[u8],
    eof: bool,
    params: &Parameters,
) -> SoapMessage {
    let mut message = SoapMessage::new();
    default_header(&mut message, url, ACTION_SEND, params)
        .shell_id(shell_id)
        .build();

    let send = message.create_body_element("Send", NS_WIN_SHELL);
    let stream = message.create_element(send, "Stream", NS_WIN_SHELL);
    message.set_attr(stream, "Name", "stdin");
    message.set_attr(stream, "CommandId", command_id);
    message.set_content(stream, STANDARD.encode(input));
    if eof {
        message.set_attr(stream, "End", "true");
    }

    message
}

/// Ask the service to terminate a command.
pub fn signal_request(
    url: &str,
    shell_id: &str,
    command_id: &str,
    params: &Parameters,
) -> SoapMessage {
    let mut message = SoapMessage::new();
    default_header(&mut message, url, ACTION_SIGNAL, params)
        .shell_id(shell_id)
        .build();

    let signal = message.create_body_element("Signal", NS_WIN_SHELL);
    message.set_attr(signal, "CommandId", command_id);
    let code = message.create_element(signal, "Code", NS_WIN_SHELL);
    message.set_content(code, SIGNAL_TERMINATE);

    message
}
