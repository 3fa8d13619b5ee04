//! HTTP Basic authentication.

use async_trait::async_trait;
use tracing::debug;

use super::{not_configured, read_reply, soap_request, HttpChannel, PostContext, Transporter};
use crate::config::{Endpoint, Parameters};
use crate::error::Result;
use crate::soap::SoapMessage;

/// Sends every envelope with Basic credentials.
#[derive(Debug, Default)]
pub struct BasicTransport {
    channel: Option<HttpChannel>,
}

impl BasicTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transporter for BasicTransport {
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()> {
        self.channel = Some(HttpChannel::new(endpoint, params)?);
        Ok(())
    }

    async fn post(&self, ctx: &PostContext, request: &SoapMessage) -> Result<String> {
        let channel = self.channel.as_ref().ok_or_else(|| not_configured(self.name()))?;
        debug!(url = %channel.url, "posting with basic auth");

        let response = soap_request(channel, request)
            .basic_auth(&ctx.credentials.username, Some(&ctx.credentials.password))
            .send()
            .await?;
        read_reply(response).await
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}
