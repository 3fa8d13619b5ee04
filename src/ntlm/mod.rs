//! NTLMv2 authentication and message sealing.
//!
//! This module implements the client side of the NTLM handshake
//! (negotiate, challenge, authenticate) including the MIC and key exchange,
//! plus the [`SecuritySession`] used to sign and seal SOAP payloads once the
//! handshake succeeded.

pub mod crypto;
pub mod messages;
pub mod session;

pub use messages::{AuthenticateMessage, ChallengeMessage, Identity, Nonces};
pub use session::{Role, SecuritySession};

use crate::config::Credentials;
use crate::error::Result;

pub const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

pub const NTLMSSP_NEGOTIATE_UNICODE: u32 = 0x0000_0001;
pub const NTLMSSP_REQUEST_TARGET: u32 = 0x0000_0004;
pub const NTLMSSP_NEGOTIATE_SIGN: u32 = 0x0000_0010;
pub const NTLMSSP_NEGOTIATE_SEAL: u32 = 0x0000_0020;
pub const NTLMSSP_NEGOTIATE_NTLM: u32 = 0x0000_0200;
pub const NTLMSSP_NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
pub const NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
pub const NTLMSSP_NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
pub const NTLMSSP_NEGOTIATE_VERSION: u32 = 0x0200_0000;
pub const NTLMSSP_NEGOTIATE_128: u32 = 0x2000_0000;
pub const NTLMSSP_NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;
pub const NTLMSSP_NEGOTIATE_56: u32 = 0x8000_0000;

/// Flags requested in the negotiate message.
pub const DEFAULT_FLAGS: u32 = NTLMSSP_NEGOTIATE_UNICODE
    | NTLMSSP_REQUEST_TARGET
    | NTLMSSP_NEGOTIATE_SIGN
    | NTLMSSP_NEGOTIATE_SEAL
    | NTLMSSP_NEGOTIATE_NTLM
    | NTLMSSP_NEGOTIATE_ALWAYS_SIGN
    | NTLMSSP_NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NTLMSSP_NEGOTIATE_TARGET_INFO
    | NTLMSSP_NEGOTIATE_VERSION
    | NTLMSSP_NEGOTIATE_128
    | NTLMSSP_NEGOTIATE_KEY_EXCH
    | NTLMSSP_NEGOTIATE_56;

/// One NTLM handshake from the client side.
///
/// ```rust
/// use winrs::config::Credentials;
/// use winrs::ntlm::NtlmClient;
///
/// let mut client = NtlmClient::new(&Credentials::new("DOMAIN\\user", "secret"));
/// let negotiate = client.negotiate();
/// assert_eq!(&negotiate[..8], b"NTLMSSP\0");
/// ```
#[derive(Debug, Clone)]
pub struct NtlmClient {
    identity: Identity,
    negotiate: Vec<u8>,
}

impl NtlmClient {
    /// Prepare a handshake for `credentials`. The workstation name is the
    /// local hostname.
    pub fn new(credentials: &Credentials) -> Self {
        let (user, domain) = credentials.user_and_domain();
        let workstation = hostname::get()
            .map(|h| h.to_string_lossy().to_uppercase())
            .unwrap_or_else(|_| "WORKSTATION".to_string());

        Self {
            identity: Identity {
                user,
                domain,
                password: credentials.password.clone(),
                workstation,
            },
            negotiate: Vec::new(),
        }
    }

    /// Type 1 message. Must be called before [`authenticate`](Self::authenticate).
    pub fn negotiate(&mut self) -> Vec<u8> {
        self.negotiate = messages::negotiate_message(DEFAULT_FLAGS);
        self.negotiate.clone()
    }

    /// Answer the server's type 2 message with a type 3 message.
    pub fn authenticate(&self, challenge: &[u8]) -> Result<AuthenticateMessage> {
        let nonces = Nonces {
            client_challenge: rand::random(),
            random_session_key: rand::random(),
            timestamp: crypto::windows_timestamp(),
        };
        messages::authenticate_message(&self.identity, &self.negotiate, challenge, &nonces)
    }
}

impl AuthenticateMessage {
    /// Sealing session for the client side of this handshake.
    pub fn session(&self) -> Result<SecuritySession> {
        SecuritySession::new(&self.exported_session_key, self.flags, Role::Client)
    }
}
