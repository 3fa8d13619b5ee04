//! Error types for winrs.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! the [`Error`] enum below. Variants follow the failure classes a WinRM client
//! runs into: transport failures, HTTP status problems, SOAP faults returned by
//! the service, malformed replies, integrity failures on the encrypted channel,
//! and usage errors caught before any network activity.

use thiserror::Error;

use crate::protocol::response::SoapFault;

/// Exit code reported when the connection to the endpoint was lost before the
/// command produced a result.
pub const EXIT_CODE_CONNECTION_LOST: i32 = 16000;

/// Exit code reported when the endpoint timed out waiting for command output.
pub const EXIT_CODE_OPERATION_TIMEOUT: i32 = 16001;

/// Result type alias for winrs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for winrs.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The HTTP request could not be sent or the connection dropped.
    #[error("error while sending request to endpoint: {0}")]
    Transport(String),

    /// The HTTP client gave up waiting for the endpoint.
    #[error("request to endpoint timed out: {0}")]
    Timeout(String),

    /// The endpoint answered with a status other than 200.
    #[error("http unexpected status: {status} {reason}")]
    HttpStatus {
        /// Numeric HTTP status
        status: u16,
        /// Canonical reason phrase
        reason: String,
        /// Raw response body, kept for diagnosis
        body: String,
    },

    /// The reply carried a content type the client cannot interpret.
    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    /// Classified client error: the connection dropped mid-session.
    #[error("A connection terminated unexpectedly, {0}")]
    ConnectionLost(String),

    /// Classified client error: no output arrived before the timeout.
    #[error("Operation timeout because there was no command output: {0}")]
    OperationTimeout(String),

    /// Reading from or writing to a caller supplied stream failed.
    #[error("I/O error: {0}")]
    Io(String),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The service answered with a SOAP fault.
    #[error("{0}")]
    Fault(Box<SoapFault>),

    /// A reply could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The reply to an ExecuteCommand request was not usable.
    ///
    /// The raw body is preserved so callers can log what the server reported.
    #[error("execute command failed: {message}")]
    ExecuteCommand {
        /// What went wrong
        message: String,
        /// Raw response body
        body: String,
    },

    /// A decrypted block did not match its declared length.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// The client or transport was configured inconsistently.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested protocol or operation is not implemented.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Authentication with the endpoint failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl Error {
    /// Build an [`Error::Parse`] from anything displayable.
    pub fn parse(message: impl std::fmt::Display) -> Self {
        Error::Parse(message.to_string())
    }

    /// Whether this error is the WS-Man OperationTimeout fault.
    ///
    /// The service raises it when no output was ready within the operation
    /// timeout; a receive loop treats it as "poll again".
    pub fn is_operation_timeout(&self) -> bool {
        match self {
            Error::Fault(fault) => fault.is_operation_timeout(),
            Error::HttpStatus { body, .. } => body.contains("OperationTimeout"),
            _ => false,
        }
    }

    /// Whether this error means the connection itself is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::ConnectionLost(_))
    }

    /// Sentinel exit code for errors that end a command without a real exit code.
    pub fn sentinel_exit_code(&self) -> Option<i32> {
        match self {
            Error::Transport(_) | Error::ConnectionLost(_) => Some(EXIT_CODE_CONNECTION_LOST),
            Error::Timeout(_) | Error::OperationTimeout(_) => Some(EXIT_CODE_OPERATION_TIMEOUT),
            e if e.is_operation_timeout() => Some(EXIT_CODE_OPERATION_TIMEOUT),
            _ => None,
        }
    }

    /// Raw response body attached to this error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::HttpStatus { body, .. } | Error::ExecuteCommand { body, .. } => Some(body),
            Error::Fault(fault) => Some(&fault.raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Parse(format!("parsing xml response: {}", e))
    }
}
