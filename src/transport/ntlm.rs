//! NTLM authentication negotiated at the HTTP layer.
//!
//! Every POST runs the three-leg handshake: an empty request carrying the
//! negotiate token, a 401 carrying the server challenge, then the real
//! request carrying the authenticate token.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, trace};

use super::{not_configured, read_reply, HttpChannel, PostContext, Transporter};
use crate::config::{Credentials, Endpoint, Parameters};
use crate::error::{Error, Result};
use crate::ntlm::{AuthenticateMessage, NtlmClient};
use crate::protocol::SOAP_CONTENT_TYPE;
use crate::soap::SoapMessage;

/// Authorization scheme used for NTLM tokens.
const SCHEME: &str = "Negotiate";

/// Pull the NTLM challenge out of the `WWW-Authenticate` headers of a 401.
pub fn challenge_from(response: &Response) -> Result<Vec<u8>> {
    for value in response.headers().get_all(WWW_AUTHENTICATE) {
        let Ok(value) = value.to_str() else { continue };
        let token = value
            .strip_prefix("Negotiate ")
            .or_else(|| value.strip_prefix("NTLM "));
        if let Some(token) = token {
            return STANDARD.decode(token.trim()).map_err(|e| {
                Error::Authentication(format!("Invalid challenge encoding: {}", e))
            });
        }
    }
    Err(Error::Authentication(
        "No NTLM challenge in WWW-Authenticate".to_string(),
    ))
}

/// Run the handshake. `finish` decorates the final request (body, content
/// type) which is sent with the authenticate token.
pub async fn handshake(
    channel: &HttpChannel,
    credentials: &Credentials,
    finish: impl FnOnce(RequestBuilder) -> RequestBuilder,
) -> Result<(Response, AuthenticateMessage)> {
    let mut ntlm = NtlmClient::new(credentials);
    let negotiate = ntlm.negotiate();

    let response = channel
        .client
        .post(&channel.url)
        .header(AUTHORIZATION, format!("{} {}", SCHEME, STANDARD.encode(&negotiate)))
        .header(CONTENT_LENGTH, "0")
        .send()
        .await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication(format!(
            "expected 401 challenge, got {}",
            response.status()
        )));
    }
    let challenge = challenge_from(&response)?;
    // Drain so the connection can be reused for the authenticate leg.
    if let Err(e) = response.bytes().await {
        trace!(error = %e, "failed to drain challenge response");
    }
    trace!(len = challenge.len(), "received NTLM challenge");

    let authenticate = ntlm.authenticate(&challenge)?;
    let request = channel.client.post(&channel.url).header(
        AUTHORIZATION,
        format!("{} {}", SCHEME, STANDARD.encode(&authenticate.message)),
    );
    let response = finish(request).send().await?;
    Ok((response, authenticate))
}

/// Transport-level NTLM. Payloads are sent in the clear.
#[derive(Debug, Default)]
pub struct NtlmTransport {
    channel: Option<HttpChannel>,
}

impl NtlmTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transporter for NtlmTransport {
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()> {
        self.channel = Some(HttpChannel::new(endpoint, params)?);
        Ok(())
    }

    async fn post(&self, ctx: &PostContext, request: &SoapMessage) -> Result<String> {
        let channel = self.channel.as_ref().ok_or_else(|| not_configured(self.name()))?;
        debug!(url = %channel.url, "posting with NTLM");

        let body = request.to_xml();
        let (response, _) = handshake(channel, &ctx.credentials, |req| {
            req.header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
                .body(body)
        })
        .await?;
        read_reply(response).await
    }

    fn name(&self) -> &'static str {
        "ntlm"
    }
}
