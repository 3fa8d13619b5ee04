//! NTLM negotiate, challenge and authenticate messages.

use super::crypto::{hmac_md5, ntowf_v2, utf16le, Rc4};
use super::{
    NTLMSSP_NEGOTIATE_KEY_EXCH, NTLMSSP_NEGOTIATE_VERSION, NTLMSSP_SIGNATURE,
};
use crate::error::{Error, Result};

/// End of an AV pair list
pub const MSV_AV_EOL: u16 = 0;
/// AV pair carrying 32-bit flags
pub const MSV_AV_FLAGS: u16 = 6;
/// AV pair carrying the server FILETIME
pub const MSV_AV_TIMESTAMP: u16 = 7;

/// MsvAvFlags bit announcing a MIC in the authenticate message
const AV_FLAG_MIC_PRESENT: u32 = 0x0000_0002;

/// Size of the fixed authenticate header including version and MIC
const AUTHENTICATE_HEADER_LEN: usize = 88;
/// Offset of the MIC inside the authenticate message
const MIC_OFFSET: usize = 72;

/// Version field sent in negotiate and authenticate messages (6.1.7601, rev 15)
const VERSION: [u8; 8] = [6, 1, 0xb1, 0x1d, 0, 0, 0, 15];

fn header(message_type: u32) -> Vec<u8> {
    let mut message = NTLMSSP_SIGNATURE.to_vec();
    message.extend_from_slice(&message_type.to_le_bytes());
    message
}

fn push_buffer_header(message: &mut Vec<u8>, len: usize, offset: usize) {
    message.extend_from_slice(&(len as u16).to_le_bytes());
    message.extend_from_slice(&(len as u16).to_le_bytes());
    message.extend_from_slice(&(offset as u32).to_le_bytes());
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::Authentication("truncated NTLM message".to_string()))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Authentication("truncated NTLM message".to_string()))
}

/// Payload referenced by the security buffer header at `at`.
fn read_buffer(data: &[u8], at: usize) -> Result<&[u8]> {
    let len = read_u16(data, at)? as usize;
    let offset = read_u32(data, at + 4)? as usize;
    if len == 0 {
        return Ok(&[]);
    }
    data.get(offset..offset + len).ok_or_else(|| {
        Error::Authentication("NTLM security buffer points outside the message".to_string())
    })
}

fn check_header(data: &[u8], message_type: u32) -> Result<()> {
    if data.len() < 12 || &data[..8] != NTLMSSP_SIGNATURE {
        return Err(Error::Authentication("invalid NTLMSSP signature".to_string()));
    }
    let found = read_u32(data, 8)?;
    if found != message_type {
        return Err(Error::Authentication(format!(
            "expected NTLM message type {}, got {}",
            message_type, found
        )));
    }
    Ok(())
}

/// Type 1 message. Domain and workstation are not supplied.
pub fn negotiate_message(flags: u32) -> Vec<u8> {
    let mut message = header(1);
    message.extend_from_slice(&flags.to_le_bytes());
    push_buffer_header(&mut message, 0, 40);
    push_buffer_header(&mut message, 0, 40);
    message.extend_from_slice(&VERSION);
    message
}

/// Decoded type 2 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    /// Flags chosen by the server
    pub flags: u32,
    /// Server nonce
    pub server_challenge: [u8; 8],
    /// Raw AV pair list
    pub target_info: Vec<u8>,
}

impl ChallengeMessage {
    /// Parse a type 2 message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_header(data, 2)?;
        if data.len() < 32 {
            return Err(Error::Authentication("NTLM challenge too short".to_string()));
        }
        let flags = read_u32(data, 20)?;
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&data[24..32]);
        let target_info = if data.len() >= 48 {
            read_buffer(data, 40)?.to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            server_challenge,
            target_info,
        })
    }
}

/// Ordered AV pair list from a challenge's target info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvPairs(Vec<(u16, Vec<u8>)>);

impl AvPairs {
    /// Parse an AV pair list. Parsing stops at `MsvAvEOL`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut at = 0;
        while at + 4 <= data.len() {
            let id = read_u16(data, at)?;
            let len = read_u16(data, at + 2)? as usize;
            if id == MSV_AV_EOL {
                break;
            }
            let value = data.get(at + 4..at + 4 + len).ok_or_else(|| {
                Error::Authentication("truncated NTLM target info".to_string())
            })?;
            pairs.push((id, value.to_vec()));
            at += 4 + len;
        }
        Ok(Self(pairs))
    }

    /// Value of the first pair with `id`.
    pub fn get(&self, id: u16) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(pair_id, _)| *pair_id == id)
            .map(|(_, value)| value.as_slice())
    }

    /// Server FILETIME, if announced.
    pub fn timestamp(&self) -> Option<u64> {
        self.get(MSV_AV_TIMESTAMP)
            .filter(|v| v.len() == 8)
            .map(|v| u64::from_le_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]))
    }

    /// OR `bits` into MsvAvFlags, adding the pair if missing.
    pub fn add_flags(&mut self, bits: u32) {
        match self.0.iter_mut().find(|(id, _)| *id == MSV_AV_FLAGS) {
            Some((_, value)) if value.len() == 4 => {
                let current = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
                *value = (current | bits).to_le_bytes().to_vec();
            }
            Some((_, value)) => *value = bits.to_le_bytes().to_vec(),
            None => self.0.push((MSV_AV_FLAGS, bits.to_le_bytes().to_vec())),
        }
    }

    /// Serialize, terminated by `MsvAvEOL`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, value) in &self.0 {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            out.extend_from_slice(value);
        }
        out.extend_from_slice(&MSV_AV_EOL.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}

/// NTLMv2 client blob ("temp").
pub fn client_blob(timestamp: u64, client_challenge: &[u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut temp = vec![0x01, 0x01, 0, 0, 0, 0, 0, 0];
    temp.extend_from_slice(&timestamp.to_le_bytes());
    temp.extend_from_slice(client_challenge);
    temp.extend_from_slice(&[0u8; 4]);
    temp.extend_from_slice(target_info);
    temp.extend_from_slice(&[0u8; 4]);
    temp
}

/// NTProofStr: HMAC-MD5 over the server challenge followed by the blob.
pub fn nt_proof_str(response_key: &[u8; 16], server_challenge: &[u8; 8], temp: &[u8]) -> [u8; 16] {
    let mut data = server_challenge.to_vec();
    data.extend_from_slice(temp);
    hmac_md5(response_key, &data)
}

/// Who is authenticating.
#[derive(Clone)]
pub struct Identity {
    pub user: String,
    pub domain: String,
    pub password: String,
    pub workstation: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("workstation", &self.workstation)
            .finish_non_exhaustive()
    }
}

/// Everything the handshake needs that would otherwise be random or clock based.
#[derive(Debug, Clone, Copy)]
pub struct Nonces {
    pub client_challenge: [u8; 8],
    pub random_session_key: [u8; 16],
    pub timestamp: u64,
}

/// A built type 3 message and the keys it commits to.
#[derive(Clone)]
pub struct AuthenticateMessage {
    /// Wire bytes
    pub message: Vec<u8>,
    /// Session key both sides derive signing and sealing keys from
    pub exported_session_key: [u8; 16],
    /// Negotiated flags
    pub flags: u32,
}

impl std::fmt::Debug for AuthenticateMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateMessage")
            .field("len", &self.message.len())
            .field("flags", &format_args!("{:#010x}", self.flags))
            .finish_non_exhaustive()
    }
}

/// Build the type 3 message answering `challenge_raw`.
///
/// `negotiate` is the type 1 message previously sent; it is covered by the
/// MIC when the server announces a timestamp.
pub fn authenticate_message(
    identity: &Identity,
    negotiate: &[u8],
    challenge_raw: &[u8],
    nonces: &Nonces,
) -> Result<AuthenticateMessage> {
    let challenge = ChallengeMessage::parse(challenge_raw)?;
    let mut av_pairs = AvPairs::parse(&challenge.target_info)?;

    let server_timestamp = av_pairs.timestamp();
    let use_mic = server_timestamp.is_some();
    let timestamp = server_timestamp.unwrap_or(nonces.timestamp);
    if use_mic {
        av_pairs.add_flags(AV_FLAG_MIC_PRESENT);
    }
    let target_info = av_pairs.to_bytes();

    let response_key = ntowf_v2(&identity.password, &identity.user, &identity.domain);
    let temp = client_blob(timestamp, &nonces.client_challenge, &target_info);
    let proof = nt_proof_str(&response_key, &challenge.server_challenge, &temp);

    let mut nt_response = proof.to_vec();
    nt_response.extend_from_slice(&temp);

    let lm_response = if use_mic {
        vec![0u8; 24]
    } else {
        let mut data = challenge.server_challenge.to_vec();
        data.extend_from_slice(&nonces.client_challenge);
        let mut lm = hmac_md5(&response_key, &data).to_vec();
        lm.extend_from_slice(&nonces.client_challenge);
        lm
    };

    // For NTLMv2 the key exchange key is the session base key.
    let key_exchange_key = hmac_md5(&response_key, &proof);
    let flags = challenge.flags;
    let (exported_session_key, encrypted_session_key) = if flags & NTLMSSP_NEGOTIATE_KEY_EXCH != 0
    {
        let encrypted = Rc4::new(&key_exchange_key).process(&nonces.random_session_key);
        (nonces.random_session_key, encrypted)
    } else {
        (key_exchange_key, Vec::new())
    };

    let domain = utf16le(&identity.domain);
    let user = utf16le(&identity.user);
    let workstation = utf16le(&identity.workstation);

    let payloads: [&[u8]; 6] = [
        &lm_response,
        &nt_response,
        &domain,
        &user,
        &workstation,
        &encrypted_session_key,
    ];

    let mut message = header(3);
    let mut offset = AUTHENTICATE_HEADER_LEN;
    for payload in payloads {
        push_buffer_header(&mut message, payload.len(), offset);
        offset += payload.len();
    }
    message.extend_from_slice(&flags.to_le_bytes());
    if flags & NTLMSSP_NEGOTIATE_VERSION != 0 {
        message.extend_from_slice(&VERSION);
    } else {
        message.extend_from_slice(&[0u8; 8]);
    }
    message.extend_from_slice(&[0u8; 16]);
    for payload in payloads {
        message.extend_from_slice(payload);
    }

    if use_mic {
        let mut data = negotiate.to_vec();
        data.extend_from_slice(challenge_raw);
        data.extend_from_slice(&message);
        let mic = hmac_md5(&exported_session_key, &data);
        message[MIC_OFFSET..MIC_OFFSET + 16].copy_from_slice(&mic);
    }

    Ok(AuthenticateMessage {
        message,
        exported_session_key,
        flags,
    })
}
