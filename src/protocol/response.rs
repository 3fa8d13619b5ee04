//! Parsers for shell replies.
//!
//! Each parser takes the raw reply body, parses it once and looks up the
//! handful of elements it cares about. Missing optional values come back as
//! `None`; malformed XML is always an error.

use std::fmt;
use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use roxmltree::Node;
use tracing::{debug, trace};

use super::{ACTION_COMMAND_RESPONSE, COMMAND_STATE_DONE};
use crate::error::{Error, Result};
use crate::soap::document::text_of;
use crate::soap::namespace::{
    NS_ADDRESSING, NS_SOAP_ENV, NS_WIN_SHELL, NS_WSMAN_DMTF, NS_WSMAN_FAULT,
};
use crate::soap::Document;

/// WSManFault code for an expired operation timeout
const WSMAN_OPERATION_TIMEOUT_CODE: &str = "2150858793";

/// Result of one Receive reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlurpOutcome {
    /// The command reported `CommandState/Done`
    pub finished: bool,
    /// Exit code, only read when `finished`
    pub exit_code: Option<i32>,
}

impl SlurpOutcome {
    /// Exit code with an absent value read as 0.
    pub fn exit_code_or_default(&self) -> i32 {
        if self.finished && self.exit_code.is_none() {
            debug!("command finished without an exit code, assuming 0");
        }
        self.exit_code.unwrap_or(0)
    }
}

/// Shell id from a Create reply.
pub fn parse_open_shell_response(response: &str) -> Result<String> {
    let doc = Document::parse(response)?;
    doc.first_text_with_attr(NS_WSMAN_DMTF, "Selector", "Name", "ShellId")
        .or_else(|| doc.first_text(NS_WIN_SHELL, "ShellId"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::parse("shell id not found in response"))
}

/// Command id from a Command reply.
///
/// Every failure keeps the raw body in [`Error::ExecuteCommand`].
pub fn parse_execute_command_response(response: &str) -> Result<String> {
    let wrap = |message: String| Error::ExecuteCommand {
        message,
        body: response.to_string(),
    };

    let doc = Document::parse(response).map_err(|e| wrap(e.to_string()))?;
    let action = doc
        .first_text(NS_ADDRESSING, "Action")
        .ok_or_else(|| wrap("getting response action: element not found".to_string()))?;
    let action = action.trim();

    if action != ACTION_COMMAND_RESPONSE {
        return Err(wrap(format!("unsupported action: {}", action)));
    }

    doc.first_text(NS_WIN_SHELL, "CommandId")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| wrap("finding command id: element not found".to_string()))
}

/// Decode every stdout and stderr stream of a Receive reply into the given
/// writers.
pub fn parse_slurp_output_err_response(
    response: &str,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<SlurpOutcome> {
    let doc = Document::parse(response)?;

    for node in doc.elements(NS_WIN_SHELL, "Stream") {
        match node.attribute("Name") {
            Some("stdout") => write_stream(&node, stdout)?,
            Some("stderr") => write_stream(&node, stderr)?,
            other => trace!(stream = ?other, "ignoring unexpected stream"),
        }
    }

    outcome(&doc)
}

/// Decode the streams named `stream_name` of a Receive reply into `stream`.
pub fn parse_slurp_output_response(
    response: &str,
    stream: &mut impl Write,
    stream_name: &str,
) -> Result<SlurpOutcome> {
    let doc = Document::parse(response)?;

    for node in doc
        .elements(NS_WIN_SHELL, "Stream")
        .filter(|node| node.attribute("Name") == Some(stream_name))
    {
        write_stream(&node, stream)?;
    }

    outcome(&doc)
}

fn write_stream(node: &Node<'_, '_>, out: &mut impl Write) -> Result<()> {
    let encoded = text_of(node);
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Ok(());
    }
    let content = STANDARD
        .decode(encoded)
        .map_err(|e| Error::parse(format!("decoding stream content: {}", e)))?;
    out.write_all(&content)
        .map_err(|e| Error::parse(format!("writing stream content: {}", e)))
}

fn outcome(doc: &Document<'_>) -> Result<SlurpOutcome> {
    if !doc.any_with_attr("State", COMMAND_STATE_DONE) {
        return Ok(SlurpOutcome::default());
    }

    let exit_code = match doc.first_text(NS_WIN_SHELL, "ExitCode") {
        Some(text) => {
            let text = text.trim();
            // Exit codes above i32::MAX (NTSTATUS values) wrap like the native API.
            let code = text
                .parse::<i64>()
                .map_err(|e| Error::parse(format!("invalid exit code '{}': {}", text, e)))?;
            Some(code as i32)
        }
        None => None,
    };

    Ok(SlurpOutcome {
        finished: true,
        exit_code,
    })
}

// ============================================================================
// Faults
// ============================================================================

/// A SOAP fault returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapFault {
    /// `env:Code/env:Value`, e.g. `s:Receiver`
    pub code: String,
    /// `env:Code/env:Subcode/env:Value`, e.g. `w:TimedOut`
    pub subcode: Option<String>,
    /// `env:Reason/env:Text`
    pub reason: String,
    /// `f:WSManFault/@Code`
    pub wsman_code: Option<String>,
    /// `f:WSManFault/f:Message`
    pub wsman_message: Option<String>,
    /// The whole reply body
    pub raw: String,
}

impl SoapFault {
    /// Whether the service gave up waiting for command output.
    pub fn is_operation_timeout(&self) -> bool {
        self.subcode
            .as_deref()
            .is_some_and(|subcode| subcode.ends_with(":TimedOut") || subcode == "TimedOut")
            || self.wsman_code.as_deref() == Some(WSMAN_OPERATION_TIMEOUT_CODE)
            || self.reason.contains("OperationTimeout")
            || self
                .wsman_message
                .as_deref()
                .is_some_and(|m| m.contains("OperationTimeout"))
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "soap fault {}", self.code)?;
        if let Some(subcode) = &self.subcode {
            write!(f, " ({})", subcode)?;
        }
        write!(f, ": {}", self.reason)?;
        if let Some(code) = &self.wsman_code {
            write!(f, " [wsman {}]", code)?;
        }
        if let Some(message) = &self.wsman_message {
            if message != &self.reason {
                write!(f, " {}", message)?;
            }
        }
        Ok(())
    }
}

/// Extract a SOAP fault from `response`, if it carries one.
pub fn parse_fault(response: &str) -> Option<SoapFault> {
    let doc = Document::parse(response).ok()?;
    let fault = doc.first(NS_SOAP_ENV, "Fault")?;

    let code_node = child(&fault, NS_SOAP_ENV.uri, "Code");
    let code = code_node
        .and_then(|c| child(&c, NS_SOAP_ENV.uri, "Value"))
        .map(|v| text_of(&v).trim().to_string())
        .unwrap_or_default();
    let subcode = code_node
        .and_then(|c| child(&c, NS_SOAP_ENV.uri, "Subcode"))
        .and_then(|s| child(&s, NS_SOAP_ENV.uri, "Value"))
        .map(|v| text_of(&v).trim().to_string());
    let reason = child(&fault, NS_SOAP_ENV.uri, "Reason")
        .and_then(|r| child(&r, NS_SOAP_ENV.uri, "Text"))
        .map(|t| text_of(&t).trim().to_string())
        .unwrap_or_default();

    let wsman = doc.first(NS_WSMAN_FAULT, "WSManFault");
    let wsman_code = wsman
        .and_then(|w| w.attribute("Code"))
        .map(str::to_string);
    let wsman_message = wsman
        .and_then(|w| child(&w, NS_WSMAN_FAULT.uri, "Message"))
        .map(|m| text_of(&m).trim().to_string());

    Some(SoapFault {
        code,
        subcode,
        reason,
        wsman_code,
        wsman_message,
        raw: response.to_string(),
    })
}

fn child<'a, 'input>(node: &Node<'a, 'input>, ns: &str, local: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| {
        c.is_element() && c.tag_name().name() == local && c.tag_name().namespace() == Some(ns)
    })
}
