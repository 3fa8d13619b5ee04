//! Message integrity and confidentiality for an established NTLM session.

use super::crypto::{hmac_md5, md5_concat, Rc4};
use super::{
    NTLMSSP_NEGOTIATE_128, NTLMSSP_NEGOTIATE_56, NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY,
    NTLMSSP_NEGOTIATE_KEY_EXCH, NTLMSSP_NEGOTIATE_SEAL,
};
use crate::error::{Error, Result};

const CLIENT_SIGNING: &[u8] = b"session key to client-to-server signing key magic constant\0";
const SERVER_SIGNING: &[u8] = b"session key to server-to-client signing key magic constant\0";
const CLIENT_SEALING: &[u8] = b"session key to client-to-server sealing key magic constant\0";
const SERVER_SEALING: &[u8] = b"session key to server-to-client sealing key magic constant\0";

/// Length of a message signature
pub const SIGNATURE_LEN: usize = 16;

/// Which end of the session this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct Direction {
    sign_key: [u8; 16],
    seal: Rc4,
    seq: u32,
}

impl Direction {
    fn new(exported: &[u8; 16], flags: u32, sign_magic: &[u8], seal_magic: &[u8]) -> Self {
        let seal_key_len = if flags & NTLMSSP_NEGOTIATE_128 != 0 {
            16
        } else if flags & NTLMSSP_NEGOTIATE_56 != 0 {
            7
        } else {
            5
        };
        Self {
            sign_key: md5_concat(&[&exported[..], sign_magic]),
            seal: Rc4::new(&md5_concat(&[&exported[..seal_key_len], seal_magic])),
            seq: 0,
        }
    }

    /// Signature over `plain`, advancing the sequence number.
    fn sign(&mut self, plain: &[u8], key_exchange: bool) -> [u8; SIGNATURE_LEN] {
        let seq = self.seq.to_le_bytes();
        let mut data = seq.to_vec();
        data.extend_from_slice(plain);
        let mut checksum = hmac_md5(&self.sign_key, &data)[..8].to_vec();
        if key_exchange {
            self.seal.apply(&mut checksum);
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..4].copy_from_slice(&1u32.to_le_bytes());
        signature[4..12].copy_from_slice(&checksum);
        signature[12..].copy_from_slice(&seq);
        self.seq = self.seq.wrapping_add(1);
        signature
    }
}

/// Sealing state derived from the exported session key.
///
/// Outgoing and incoming traffic use separate keys and sequence numbers.
/// Every call to [`wrap`](Self::wrap) or [`unwrap`](Self::unwrap) advances
/// the matching RC4 stream, so messages must be processed in order.
pub struct SecuritySession {
    outgoing: Direction,
    incoming: Direction,
    key_exchange: bool,
}

impl SecuritySession {
    /// Derive keys for `role`. Fails if the negotiated flags do not allow sealing.
    pub fn new(exported_session_key: &[u8; 16], flags: u32, role: Role) -> Result<Self> {
        if flags & NTLMSSP_NEGOTIATE_SEAL == 0 {
            return Err(Error::Unsupported(
                "server did not negotiate NTLM sealing".to_string(),
            ));
        }
        if flags & NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY == 0 {
            return Err(Error::Unsupported(
                "NTLM sealing without extended session security".to_string(),
            ));
        }

        let client = Direction::new(exported_session_key, flags, CLIENT_SIGNING, CLIENT_SEALING);
        let server = Direction::new(exported_session_key, flags, SERVER_SIGNING, SERVER_SEALING);
        let (outgoing, incoming) = match role {
            Role::Client => (client, server),
            Role::Server => (server, client),
        };

        Ok(Self {
            outgoing,
            incoming,
            key_exchange: flags & NTLMSSP_NEGOTIATE_KEY_EXCH != 0,
        })
    }

    /// Seal `message`. Returns `(sealed, signature)`.
    pub fn wrap(&mut self, message: &[u8]) -> (Vec<u8>, [u8; SIGNATURE_LEN]) {
        let sealed = self.outgoing.seal.process(message);
        let signature = self.outgoing.sign(message, self.key_exchange);
        (sealed, signature)
    }

    /// Unseal `sealed` and verify it against `signature`.
    pub fn unwrap(&mut self, sealed: &[u8], signature: &[u8]) -> Result<Vec<u8>> {
        if signature.len() != SIGNATURE_LEN {
            return Err(Error::Integrity(format!(
                "signature is {} bytes, expected {}",
                signature.len(),
                SIGNATURE_LEN
            )));
        }
        let plain = self.incoming.seal.process(sealed);
        let expected = self.incoming.sign(&plain, self.key_exchange);
        if expected[..] != signature[..] {
            return Err(Error::Integrity("message signature mismatch".to_string()));
        }
        Ok(plain)
    }
}

impl std::fmt::Debug for SecuritySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuritySession")
            .field("outgoing_seq", &self.outgoing.seq)
            .field("incoming_seq", &self.incoming.seq)
            .finish_non_exhaustive()
    }
}
