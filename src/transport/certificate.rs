//! TLS client certificate authentication.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Identity;
use tracing::debug;

use super::{not_configured, read_reply, soap_request, HttpChannel, PostContext, Transporter};
use crate::config::{Endpoint, Parameters};
use crate::error::{Error, Result};
use crate::soap::SoapMessage;

/// Authorization value asking the service to map the client certificate.
pub const MUTUAL_AUTH: &str =
    "http://schemas.dmtf.org/wbem/wsman/1/wsman/secprofile/https/mutual";

/// Authenticates with a client certificate over HTTPS.
#[derive(Debug, Default)]
pub struct CertificateTransport {
    channel: Option<HttpChannel>,
}

impl CertificateTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build a reqwest identity from separate PEM certificate and key.
fn identity(cert: &[u8], key: &[u8]) -> Result<Identity> {
    let mut pem = cert.to_vec();
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend_from_slice(key);
    Identity::from_pem(&pem)
        .map_err(|e| Error::InvalidConfig(format!("Invalid client certificate or key: {}", e)))
}

#[async_trait]
impl Transporter for CertificateTransport {
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()> {
        if !endpoint.https {
            return Err(Error::InvalidConfig(
                "certificate authentication requires https".to_string(),
            ));
        }
        let (Some(cert), Some(key)) = (&endpoint.cert, &endpoint.key) else {
            return Err(Error::InvalidConfig(
                "certificate authentication requires a client certificate and key".to_string(),
            ));
        };

        let identity = identity(cert, key)?;
        self.channel = Some(HttpChannel::with_identity(endpoint, params, Some(identity))?);
        Ok(())
    }

    async fn post(&self, _ctx: &PostContext, request: &SoapMessage) -> Result<String> {
        let channel = self.channel.as_ref().ok_or_else(|| not_configured(self.name()))?;
        debug!(url = %channel.url, "posting with client certificate");

        let response = soap_request(channel, request)
            .header(AUTHORIZATION, MUTUAL_AUTH)
            .send()
            .await?;
        read_reply(response).await
    }

    fn name(&self) -> &'static str {
        "certificate"
    }
}
