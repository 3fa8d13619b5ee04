//! WS-Management shell protocol: request factories and reply parsers.

pub mod request;
pub mod response;

pub use request::{
    delete_shell_request, execute_command_request, open_shell_request, receive_request,
    send_input_request, signal_request,
};
pub use response::{
    parse_execute_command_response, parse_fault, parse_open_shell_response,
    parse_slurp_output_err_response, parse_slurp_output_response, SlurpOutcome, SoapFault,
};

/// WS-Transfer Create
pub const ACTION_CREATE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create";
/// WS-Transfer Delete
pub const ACTION_DELETE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete";
/// Start a command in a shell
pub const ACTION_COMMAND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command";
/// Action carried by a successful Command reply
pub const ACTION_COMMAND_RESPONSE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandResponse";
/// Poll for output
pub const ACTION_RECEIVE: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive";
/// Push stdin
pub const ACTION_SEND: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Send";
/// Signal a running command
pub const ACTION_SIGNAL: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Signal";

/// The cmd.exe shell resource
pub const RESOURCE_URI_CMD: &str = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd";

/// Terminate signal code
pub const SIGNAL_TERMINATE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/signal/terminate";

/// CommandState reported once a command has exited
pub const COMMAND_STATE_DONE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done";

/// Media type of every SOAP request and reply
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";
