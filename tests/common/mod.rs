//! Shared test utilities and fixtures for the winrs test suite.
//!
//! This module provides:
//! - A scripted [`Transporter`] plugged in through a transport decorator
//! - Canned WinRM replies (shell created, command started, output, done)
//! - Helpers to name the action of a recorded request
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;

use winrs::config::{AuthMethod, Credentials, Endpoint, Parameters};
use winrs::soap::SoapMessage;
use winrs::transport::{PostContext, TransportDecorator, Transporter};
use winrs::{Client, Error, Result};

pub const SHELL_ID: &str = "67A74734-DD32-4F10-89DE-49A060483810";
pub const COMMAND_ID: &str = "1A6DEE6B-EC68-4DD6-87E9-030C0048ECC4";

// ============================================================================
// Fixtures
// ============================================================================

pub fn create_shell_response() -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:x="http://schemas.xmlsoap.org/ws/2004/09/transfer" xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell" xml:lang="en-US">
  <s:Header>
    <a:Action>http://schemas.xmlsoap.org/ws/2004/09/transfer/CreateResponse</a:Action>
    <a:MessageID>uuid:9B1B1E7A-8B3C-4A4E-9C1E-4B5C5E1F9A2B</a:MessageID>
    <a:To>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:To>
  </s:Header>
  <s:Body>
    <x:ResourceCreated>
      <a:Address>http://windows-host:5985/wsman</a:Address>
      <a:ReferenceParameters>
        <w:ResourceURI>http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd</w:ResourceURI>
        <w:SelectorSet><w:Selector Name="ShellId">{SHELL_ID}</w:Selector></w:SelectorSet>
      </a:ReferenceParameters>
    </x:ResourceCreated>
  </s:Body>
</s:Envelope>"#
    )
}

pub fn execute_command_response() -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell">
  <s:Header>
    <a:Action>http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandResponse</a:Action>
  </s:Header>
  <s:Body>
    <rsp:CommandResponse><rsp:CommandId>{COMMAND_ID}</rsp:CommandId></rsp:CommandResponse>
  </s:Body>
</s:Envelope>"#
    )
}

/// Receive reply with output and, when `exit_code` is set, the Done state.
pub fn output_response(stdout: &str, stderr: &str, exit_code: Option<i32>) -> String {
    let mut streams = String::new();
    if !stdout.is_empty() {
        streams.push_str(&format!(
            r#"<rsp:Stream Name="stdout" CommandId="{COMMAND_ID}">{}</rsp:Stream>"#,
            STANDARD.encode(stdout)
        ));
    }
    if !stderr.is_empty() {
        streams.push_str(&format!(
            r#"<rsp:Stream Name="stderr" CommandId="{COMMAND_ID}">{}</rsp:Stream>"#,
            STANDARD.encode(stderr)
        ));
    }
    let state = match exit_code {
        Some(code) => format!(
            r#"<rsp:CommandState CommandId="{COMMAND_ID}" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done"><rsp:ExitCode>{code}</rsp:ExitCode></rsp:CommandState>"#
        ),
        None => format!(
            r#"<rsp:CommandState CommandId="{COMMAND_ID}" State="http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running"/>"#
        ),
    };
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:rsp="http://schemas.microsoft.com/wbem/wsman/1/windows/shell"><s:Body><rsp:ReceiveResponse>{streams}{state}</rsp:ReceiveResponse></s:Body></s:Envelope>"#
    )
}

pub fn empty_response() -> String {
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Header/><s:Body/></s:Envelope>"#
        .to_string()
}

pub fn operation_timeout_fault() -> String {
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:w="http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd" xmlns:f="http://schemas.microsoft.com/wbem/wsman/1/wsmanfault">
  <s:Body>
    <s:Fault>
      <s:Code><s:Value>s:Receiver</s:Value><s:Subcode><s:Value>w:TimedOut</s:Value></s:Subcode></s:Code>
      <s:Reason><s:Text xml:lang="en-US">The WS-Management service cannot complete the operation within the time specified in OperationTimeout.</s:Text></s:Reason>
      <s:Detail><f:WSManFault Code="2150858793" Machine="windows-host"><f:Message>The WS-Management service cannot complete the operation within the time specified in OperationTimeout.</f:Message></f:WSManFault></s:Detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#
        .to_string()
}

/// Short name of the action carried by a request.
pub fn action_of(xml: &str) -> &'static str {
    for (suffix, name) in [
        ("transfer/Create</", "Create"),
        ("transfer/Delete</", "Delete"),
        ("shell/Command</", "Command"),
        ("shell/Receive</", "Receive"),
        ("shell/Send</", "Send"),
        ("shell/Signal</", "Signal"),
    ] {
        if xml.contains(suffix) {
            return name;
        }
    }
    "Unknown"
}

// ============================================================================
// Scripted WinRM service
// ============================================================================

/// What the fake service answers to a Receive.
#[derive(Debug, Clone)]
pub enum ReceiveReply {
    Output(String),
    Fail(Error),
}

/// A fake WinRM service living behind the transport seam.
#[derive(Default)]
pub struct FakeService {
    pub requests: Mutex<Vec<String>>,
    pub receives: Mutex<VecDeque<ReceiveReply>>,
}

impl FakeService {
    pub fn with_receives(replies: impl IntoIterator<Item = ReceiveReply>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            receives: Mutex::new(replies.into_iter().collect()),
        })
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.requests.lock().iter().map(|r| action_of(r)).collect()
    }

    pub fn requests_for(&self, action: &str) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|r| action_of(r) == action)
            .cloned()
            .collect()
    }

    fn answer(&self, xml: &str) -> Result<String> {
        self.requests.lock().push(xml.to_string());
        match action_of(xml) {
            "Create" => Ok(create_shell_response()),
            "Command" => Ok(execute_command_response()),
            "Receive" => match self.receives.lock().pop_front() {
                Some(ReceiveReply::Output(body)) => Ok(body),
                Some(ReceiveReply::Fail(error)) => Err(error),
                None => Err(Error::Transport("no more scripted replies".into())),
            },
            _ => Ok(empty_response()),
        }
    }
}

struct FakeTransport(Arc<FakeService>);

#[async_trait]
impl Transporter for FakeTransport {
    fn configure(&mut self, _endpoint: &Endpoint, _params: &Parameters) -> Result<()> {
        Ok(())
    }

    async fn post(&self, _ctx: &PostContext, request: &SoapMessage) -> Result<String> {
        self.0.answer(&request.to_xml())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A client talking to `service` instead of the network.
pub fn client_for(service: &Arc<FakeService>, params: Parameters) -> Client {
    let service = service.clone();
    let decorator: TransportDecorator =
        Arc::new(move || -> Box<dyn Transporter> { Box::new(FakeTransport(service.clone())) });
    Client::with_parameters(
        &Endpoint::new("localhost"),
        Credentials::new("Administrator", "v3r1S3cre7"),
        AuthMethod::Basic,
        params.with_transport_decorator(decorator),
    )
    .expect("client with fake transport")
}

/// The WinRM timeout fault as the transports surface it.
pub fn operation_timeout_error() -> Error {
    let fault = winrs::protocol::parse_fault(&operation_timeout_fault()).expect("fixture is a fault");
    Error::Fault(Box::new(fault))
}
