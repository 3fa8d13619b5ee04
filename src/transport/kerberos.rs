//! Kerberos/SPNEGO placeholder.
//!
//! The transport can be selected and configured so that callers can wire it
//! up ahead of time, but posting fails with [`Error::Unsupported`].

use async_trait::async_trait;
use tracing::warn;

use super::{HttpChannel, PostContext, Transporter};
use crate::config::{Endpoint, Parameters};
use crate::error::{Error, Result};
use crate::soap::SoapMessage;

#[derive(Debug, Default)]
pub struct KerberosTransport {
    channel: Option<HttpChannel>,
}

impl KerberosTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transporter for KerberosTransport {
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()> {
        self.channel = Some(HttpChannel::new(endpoint, params)?);
        Ok(())
    }

    async fn post(&self, _ctx: &PostContext, _request: &SoapMessage) -> Result<String> {
        warn!(configured = self.channel.is_some(), "kerberos transport is not implemented");
        Err(Error::Unsupported(
            "Kerberos authentication is not supported, use NTLM or certificate authentication"
                .to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "kerberos"
    }
}
