//! Primitive building blocks for NTLMv2: MD4/MD5 hashes, HMAC-MD5 and RC4.

use std::fmt;

use md4::{Digest, Md4};
use rc4::consts::U16;
use rc4::{KeyInit, StreamCipher};

/// Encode a string as UTF-16LE bytes.
pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// NT hash: MD4 of the UTF-16LE password.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(utf16le(password));

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// NTOWFv2: HMAC-MD5 keyed with the NT hash over `upper(user) + domain`.
///
/// Only the user name is uppercased.
pub fn ntowf_v2(password: &str, user: &str, domain: &str) -> [u8; 16] {
    let identity = format!("{}{}", user.to_uppercase(), domain);
    hmac_md5(&nt_hash(password), &utf16le(&identity))
}

/// MD5 over the concatenation of `parts`.
pub fn md5_concat(parts: &[&[u8]]) -> [u8; 16] {
    let mut context = md5::Context::new();
    for part in parts {
        context.consume(part);
    }
    context.compute().0
}

/// HMAC-MD5 computation
pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    // Pad key to 64 bytes
    let mut key_block = [0u8; 64];
    if key.len() > 64 {
        key_block[..16].copy_from_slice(&md5::compute(key).0);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; 64];
    let mut opad = [0x5cu8; 64];
    for (i, b) in key_block.iter().enumerate() {
        ipad[i] ^= b;
        opad[i] ^= b;
    }

    let inner = md5_concat(&[&ipad[..], data]);
    md5_concat(&[&opad[..], &inner[..]])
}

/// Current time as a Windows FILETIME (100ns ticks since 1601-01-01).
pub fn windows_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    const EPOCH_DIFF: u64 = 11_644_473_600;
    const TICKS_PER_SECOND: u64 = 10_000_000;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    (now.as_secs() + EPOCH_DIFF) * TICKS_PER_SECOND + u64::from(now.subsec_nanos() / 100)
}

/// RC4 stream cipher state.
///
/// The keystream position carries across calls, which is what NTLM sealing
/// relies on: every message and every checksum advances the same handle.
pub struct Rc4 {
    cipher: rc4::Rc4<U16>,
}

impl Rc4 {
    /// Key schedule over a 128-bit key.
    pub fn new(key: &[u8; 16]) -> Self {
        Self {
            cipher: rc4::Rc4::new(key.into()),
        }
    }

    /// XOR `data` with the keystream in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }

    /// XOR a copy of `data` with the keystream.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply(&mut out);
        out
    }
}

impl fmt::Debug for Rc4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rc4 { .. }")
    }
}

#[cfg(test)]
pub(crate) fn hex(s: &str) -> Vec<u8> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}
