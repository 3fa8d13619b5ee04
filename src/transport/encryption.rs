//! Message-level encryption over plain HTTP.
//!
//! After an NTLM handshake on an empty request ("priming"), every SOAP
//! envelope is sealed with the session keys and sent inside a small
//! multipart framing:
//!
//! ```text
//! --Encrypted Boundary\r\n
//! \tContent-Type: application/HTTP-SPNEGO-session-encrypted\r\n
//! \tOriginalContent: type=application/soap+xml;charset=UTF-8;Length=<n>\r\n
//! --Encrypted Boundary\r\n
//! \tContent-Type: application/octet-stream\r\n
//! <u32 LE signature length><signature><sealed envelope>
//! --Encrypted Boundary--\r\n
//! ```
//!
//! Replies come back in the same framing and are unsealed, verified and
//! checked against their declared length.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::ntlm::{handshake, NtlmTransport};
use super::{check_reply, header_str, not_configured, HttpChannel, PostContext, Transporter};
use crate::config::{Credentials, Endpoint, Parameters};
use crate::error::{Error, Result};
use crate::ntlm::session::SIGNATURE_LEN;
use crate::ntlm::SecuritySession;
use crate::protocol::SOAP_CONTENT_TYPE;
use crate::soap::SoapMessage;

/// MIME boundary parameter
pub const BOUNDARY: &str = "Encrypted Boundary";

const MIME_BOUNDARY: &[u8] = b"--Encrypted Boundary\r\n";
const MIME_END: &[u8] = b"--Encrypted Boundary--\r\n";
const OCTET_STREAM: &[u8] = b"\tContent-Type: application/octet-stream\r\n";

/// Sub-protocol of the encrypted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionProtocol {
    Ntlm,
    CredSsp,
    Kerberos,
}

impl EncryptionProtocol {
    /// Parse a protocol tag (`ntlm`, `credssp`, `kerberos`).
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "ntlm" => Ok(Self::Ntlm),
            "credssp" => Ok(Self::CredSsp),
            "kerberos" => Ok(Self::Kerberos),
            other => Err(Error::InvalidConfig(format!(
                "Encryption for protocol '{}' not supported",
                other
            ))),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ntlm => "ntlm",
            Self::CredSsp => "credssp",
            Self::Kerberos => "kerberos",
        }
    }

    /// Content type of the encrypted parts.
    pub fn protocol_string(&self) -> &'static str {
        match self {
            Self::Ntlm | Self::Kerberos => "application/HTTP-SPNEGO-session-encrypted",
            Self::CredSsp => "application/HTTP-CredSSP-session-encrypted",
        }
    }

    /// Content type of an encrypted request.
    pub fn request_content_type(&self) -> String {
        format!(
            "multipart/encrypted;protocol=\"{}\";boundary=\"{}\"",
            self.protocol_string(),
            BOUNDARY
        )
    }

    fn ensure_supported(&self) -> Result<()> {
        match self {
            Self::Ntlm => Ok(()),
            other => Err(Error::Unsupported(format!(
                "Encryption for protocol '{}' is not implemented",
                other.tag()
            ))),
        }
    }
}

/// Seal `plaintext` and frame it, closing boundary included.
pub fn encrypt_message(
    protocol: EncryptionProtocol,
    session: &mut SecuritySession,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    protocol.ensure_supported()?;

    let (sealed, signature) = session.wrap(plaintext);

    let mut body = Vec::with_capacity(plaintext.len() + 256);
    body.extend_from_slice(MIME_BOUNDARY);
    body.extend_from_slice(format!("\tContent-Type: {}\r\n", protocol.protocol_string()).as_bytes());
    body.extend_from_slice(
        format!(
            "\tOriginalContent: type={};Length={}\r\n",
            SOAP_CONTENT_TYPE,
            plaintext.len()
        )
        .as_bytes(),
    );
    body.extend_from_slice(MIME_BOUNDARY);
    body.extend_from_slice(OCTET_STREAM);
    body.extend_from_slice(&(signature.len() as u32).to_le_bytes());
    body.extend_from_slice(&signature);
    body.extend_from_slice(&sealed);
    body.extend_from_slice(MIME_END);
    Ok(body)
}

/// Unframe, unseal and verify an encrypted body.
///
/// Any mismatch fails the whole body; no partial plaintext is returned.
pub fn decrypt_message(
    protocol: EncryptionProtocol,
    session: &mut SecuritySession,
    body: &[u8],
) -> Result<Vec<u8>> {
    protocol.ensure_supported()?;

    let parts: Vec<&[u8]> = split(body, MIME_BOUNDARY)
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() || parts.len() % 2 != 0 {
        return Err(Error::Integrity(format!(
            "encrypted body has {} MIME parts, expected header/payload pairs",
            parts.len()
        )));
    }

    let mut message = Vec::new();
    for pair in parts.chunks_exact(2) {
        let expected = declared_length(pair[0])?;

        let mut payload = pair[1];
        if let Some(stripped) = payload.strip_suffix(MIME_END) {
            payload = stripped;
        }
        if let Some(stripped) = payload.strip_prefix(OCTET_STREAM) {
            payload = stripped;
        }

        if payload.len() < 4 {
            return Err(Error::Integrity("encrypted payload too short".to_string()));
        }
        let signature_len =
            u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        if signature_len != SIGNATURE_LEN || payload.len() < 4 + signature_len {
            return Err(Error::Integrity(format!(
                "invalid signature length {}",
                signature_len
            )));
        }
        let signature = &payload[4..4 + signature_len];
        let sealed = &payload[4 + signature_len..];

        let plain = session.unwrap(sealed, signature)?;
        if plain.len() != expected {
            return Err(Error::Integrity(
                "encrypted length from server does not match the expected size, message has been tampered with"
                    .to_string(),
            ));
        }
        message.extend_from_slice(&plain);
    }

    Ok(message)
}

/// Value of `Length=` in a part header.
fn declared_length(header: &[u8]) -> Result<usize> {
    const KEY: &[u8] = b"Length=";
    let at = find(header, KEY)
        .ok_or_else(|| Error::Integrity("encrypted part has no Length".to_string()))?;
    let digits: String = header[at + KEY.len()..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .map(|b| *b as char)
        .collect();
    digits
        .parse()
        .map_err(|_| Error::Integrity("encrypted part has an invalid Length".to_string()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split<'a>(data: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut rest = data;
    while let Some(at) = find(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len()..];
    }
    parts.push(rest);
    parts
}

// ============================================================================
// Transport
// ============================================================================

/// NTLM with message-level encryption.
///
/// The security session is established on the first POST and reused; the
/// async mutex serializes exchanges so sequence numbers stay in step.
#[derive(Debug)]
pub struct EncryptedTransport {
    protocol: EncryptionProtocol,
    channel: Option<HttpChannel>,
    fallback: NtlmTransport,
    session: Mutex<Option<SecuritySession>>,
}

impl EncryptedTransport {
    /// Create a transport for protocol `tag`. Unknown tags are rejected.
    pub fn new(tag: &str) -> Result<Self> {
        Ok(Self {
            protocol: EncryptionProtocol::from_tag(tag)?,
            channel: None,
            fallback: NtlmTransport::new(),
            session: Mutex::new(None),
        })
    }

    pub fn protocol(&self) -> EncryptionProtocol {
        self.protocol
    }

    /// Authenticate an empty request and derive the session keys.
    async fn prime(
        &self,
        channel: &HttpChannel,
        credentials: &Credentials,
    ) -> Result<SecuritySession> {
        debug!(url = %channel.url, "priming encrypted session");
        let (response, authenticate) = handshake(channel, credentials, |req| {
            req.header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
                .header(CONTENT_LENGTH, "0")
        })
        .await?;

        let status = response.status();
        if let Err(e) = response.bytes().await {
            trace!(error = %e, "failed to drain priming response");
        }
        if status != StatusCode::OK {
            return Err(Error::Authentication(format!(
                "priming request returned {}",
                status
            )));
        }
        authenticate.session()
    }

    /// Read a reply to a request sealed with `session`.
    ///
    /// The session is handed back only when the reply was sealed with it and
    /// verified. Otherwise the two sides may be out of step and the caller
    /// has to prime again.
    async fn read_encrypted(
        &self,
        response: Response,
        mut session: SecuritySession,
    ) -> (Option<SecuritySession>, Result<String>) {
        let status = response.status();
        let content_type = header_str(&response, CONTENT_TYPE);
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return (None, Err(e.into())),
        };

        let marker = format!("protocol=\"{}\"", self.protocol.protocol_string());
        match content_type {
            Some(ct) if ct.contains(&marker) => {
                let plain = match decrypt_message(self.protocol, &mut session, &body) {
                    Ok(plain) => plain,
                    Err(e) => {
                        debug!(error = %e, "dropping encrypted session");
                        return (None, Err(e));
                    }
                };
                let reply = String::from_utf8(plain)
                    .map_err(|e| Error::parse(format!("decrypted reply is not UTF-8: {}", e)))
                    .and_then(|text| {
                        trace!(status = status.as_u16(), body = %text, "decrypted reply");
                        check_reply(status, Some(SOAP_CONTENT_TYPE), text)
                    });
                (Some(session), reply)
            }
            other => {
                debug!(status = status.as_u16(), "reply was not sealed, dropping encrypted session");
                let reply = check_reply(
                    status,
                    other.as_deref(),
                    String::from_utf8_lossy(&body).into_owned(),
                );
                (None, reply)
            }
        }
    }
}

#[async_trait]
impl Transporter for EncryptedTransport {
    fn configure(&mut self, endpoint: &Endpoint, params: &Parameters) -> Result<()> {
        self.channel = Some(HttpChannel::new(endpoint, params)?);
        self.fallback.configure(endpoint, params)
    }

    async fn post(&self, ctx: &PostContext, request: &SoapMessage) -> Result<String> {
        let channel = self.channel.as_ref().ok_or_else(|| not_configured(self.name()))?;
        self.protocol.ensure_supported()?;

        let plaintext = request.to_xml();
        let content_type = self.protocol.request_content_type();
        let mut slot = self.session.lock().await;
        let mut reprimed = false;

        loop {
            // Out of the slot for the whole exchange: if this future is
            // dropped mid-flight the next post primes a fresh session.
            let mut session = match slot.take() {
                Some(session) => session,
                None => match self.prime(channel, &ctx.credentials).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(error = %e, "encryption priming failed, falling back to NTLM transport");
                        drop(slot);
                        return self.fallback.post(ctx, request).await;
                    }
                },
            };

            let body = encrypt_message(self.protocol, &mut session, plaintext.as_bytes())?;
            let response = channel.post(&content_type, body).send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && !reprimed {
                debug!("encrypted session rejected, priming again");
                reprimed = true;
                continue;
            }
            let (session, reply) = self.read_encrypted(response, session).await;
            *slot = session;
            return reply;
        }
    }

    fn name(&self) -> &'static str {
        "encrypted"
    }
}
