//! HTTP transports carrying SOAP envelopes to the WinRM service.
//!
//! Every authentication scheme is its own [`Transporter`]; the client picks
//! one from [`AuthMethod`] when it is built, or uses the one produced by a
//! [`TransportDecorator`] if the parameters carry one.

pub mod basic;
pub mod certificate;
pub mod encryption;
pub mod kerberos;
pub mod ntlm;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, ClientBuilder, Identity, StatusCode};
use tracing::{debug, trace};

pub use basic::BasicTransport;
pub use certificate::CertificateTransport;
pub use encryption::{EncryptedTransport, EncryptionProtocol};
pub use kerberos::KerberosTransport;
pub use ntlm::NtlmTransport;

use crate::config::{AuthMethod, Credentials, Endpoint, Parameters};
use crate::error::{Error, Result};
use crate::protocol::{parse_fault, SOAP_CONTENT_TYPE};
use crate::soap::SoapMessage;

/// Factory replacing the transport chosen from the auth method.
pub type TransportDecorator = Arc<dyn Fn() -> Box<dyn Transporter> + Send + Sync>;

/// Per-request information handed to a transport.
#[derive(Debug, Clone)]
pub struct PostContext {
    /// Endpoint URL the envelope is addressed to
    pub url: String,
    /// Credentials of the client
    pub credentials: Credentials,
}

/// Moves SOAP envelopes to the service and returns the reply body.
#[async_trait]
pub trait Transporter: Send + Sync {
    /// Build the HTTP client for `endpoint`. Called once before any `post`.
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()>;

    /// Send `request` and return the reply body.
    async fn post(&self, ctx: &PostContext, request: &SoapMessage) -> Result<String>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Pick the transport for `auth`, checking what can be checked before any
/// network activity.
pub fn new_transporter(
    auth: &AuthMethod,
    credentials: &Credentials,
) -> Result<Box<dyn Transporter>> {
    let transport: Box<dyn Transporter> = match auth {
        AuthMethod::Basic => {
            if credentials.username.is_empty() || credentials.password.is_empty() {
                return Err(Error::InvalidConfig(
                    "basic authentication requires a username and password".to_string(),
                ));
            }
            Box::new(BasicTransport::new())
        }
        AuthMethod::Certificate => Box::new(CertificateTransport::new()),
        AuthMethod::Ntlm => Box::new(NtlmTransport::new()),
        AuthMethod::Kerberos => Box::new(KerberosTransport::new()),
        AuthMethod::Encrypted(tag) => Box::new(EncryptedTransport::new(tag)?),
    };
    Ok(transport)
}

// ============================================================================
// HTTP channel
// ============================================================================

/// A configured HTTP client and the URL it posts to.
#[derive(Clone)]
pub struct HttpChannel {
    pub(crate) client: Client,
    pub(crate) url: String,
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel").field("url", &self.url).finish()
    }
}

impl HttpChannel {
    /// Build a client honouring the endpoint's TLS settings and the dial options.
    pub fn new(endpoint: &Endpoint, params: &Parameters) -> Result<Self> {
        Self::with_identity(endpoint, params, None)
    }

    /// Same as [`new`](Self::new) with a TLS client identity.
    pub fn with_identity(
        endpoint: &Endpoint,
        params: &Parameters,
        identity: Option<Identity>,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(params.http_timeout(endpoint.timeout))
            .danger_accept_invalid_certs(endpoint.insecure)
            .pool_max_idle_per_host(1)
            .user_agent(concat!("winrs/", env!("CARGO_PKG_VERSION")));

        if let Some(ca) = &endpoint.ca_cert {
            for cert in split_pem_bundle(ca)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        let dial = params.dial.clone().unwrap_or_default();
        builder = builder
            .connect_timeout(dial.connect_timeout)
            .tcp_keepalive(dial.keep_alive);

        let (builder, url) = pin_addresses(builder, endpoint, dial.resolve)?;
        let client = builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        debug!(
            url = %url,
            insecure = endpoint.insecure,
            timeout = ?params.http_timeout(endpoint.timeout),
            "HTTP client configured"
        );
        Ok(Self { client, url })
    }

    /// POST `body` with the given content type.
    pub(crate) fn post(&self, content_type: &str, body: impl Into<reqwest::Body>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
    }
}

/// Point the client at the endpoint, honouring a TLS server-name override
/// and an explicit dial address.
///
/// With a server-name override the request URL carries that name (so the
/// certificate is checked against it) and the name is pinned to the
/// endpoint's real address.
fn pin_addresses(
    builder: ClientBuilder,
    endpoint: &Endpoint,
    resolve: Option<SocketAddr>,
) -> Result<(ClientBuilder, String)> {
    let Some(server_name) = endpoint.tls_server_name.as_deref() else {
        let builder = match resolve {
            Some(addr) => builder.resolve(&endpoint.host, addr),
            None => builder,
        };
        return Ok((builder, checked_url(endpoint)?));
    };

    let addr = match resolve {
        Some(addr) => addr,
        None => (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| {
                Error::InvalidConfig(format!("Failed to resolve '{}': {}", endpoint.host, e))
            })?
            .next()
            .ok_or_else(|| {
                Error::InvalidConfig(format!("No address found for '{}'", endpoint.host))
            })?,
    };

    let mut named = endpoint.clone();
    named.host = server_name.to_string();
    Ok((builder.resolve(server_name, addr), checked_url(&named)?))
}

/// The endpoint URL, rejected early if the host cannot form one.
fn checked_url(endpoint: &Endpoint) -> Result<String> {
    let url = endpoint.url();
    url::Url::parse(&url)
        .map_err(|e| Error::InvalidConfig(format!("Invalid endpoint URL '{}': {}", url, e)))?;
    Ok(url)
}

/// Split a PEM bundle into individual certificates.
fn split_pem_bundle(pem: &[u8]) -> Result<Vec<Certificate>> {
    const END: &str = "-----END CERTIFICATE-----";

    let text = String::from_utf8_lossy(pem);
    let mut certs = Vec::new();
    let mut rest = text.as_ref();
    while let Some(end) = rest.find(END) {
        let block = &rest[..end + END.len()];
        let cert = Certificate::from_pem(block.trim().as_bytes())
            .map_err(|e| Error::InvalidConfig(format!("Invalid CA cert: {}", e)))?;
        certs.push(cert);
        rest = &rest[end + END.len()..];
    }

    if certs.is_empty() {
        return Err(Error::InvalidConfig(
            "CA bundle contains no certificates".to_string(),
        ));
    }
    Ok(certs)
}

// ============================================================================
// Replies
// ============================================================================

/// Apply the reply contract shared by every transport.
///
/// - a SOAP fault body is returned as [`Error::Fault`], whatever the status
/// - any other status than 200 is [`Error::HttpStatus`]
/// - a 200 reply must be `application/soap+xml`
pub fn check_reply(
    status: StatusCode,
    content_type: Option<&str>,
    body: String,
) -> Result<String> {
    if let Some(fault) = parse_fault(&body) {
        debug!(status = status.as_u16(), code = %fault.code, "service returned a SOAP fault");
        return Err(Error::Fault(Box::new(fault)));
    }

    if status != StatusCode::OK {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        });
    }

    match content_type {
        Some(ct) if ct.contains("application/soap+xml") => Ok(body),
        other => Err(Error::InvalidContentType(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// Read a reply and apply [`check_reply`].
pub async fn read_reply(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let content_type = header_str(&response, CONTENT_TYPE);
    let body = response.text().await?;
    trace!(status = status.as_u16(), body = %body, "reply");
    check_reply(status, content_type.as_deref(), body)
}

pub(crate) fn header_str(
    response: &reqwest::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Error for a transport used before [`Transporter::configure`].
pub(crate) fn not_configured(name: &str) -> Error {
    Error::InvalidConfig(format!("{} transport used before configure", name))
}

/// Serialized request with the SOAP content type, as every plain transport sends it.
pub(crate) fn soap_request(channel: &HttpChannel, request: &SoapMessage) -> reqwest::RequestBuilder {
    channel.post(SOAP_CONTENT_TYPE, request.to_xml())
}
