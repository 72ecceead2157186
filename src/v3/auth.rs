//! Authentication key derivation and HMAC operations (RFC 3414).
//!
//! This module implements:
//! - Password-to-key derivation (1MB expansion + hash)
//! - Key localization (binding key to engine ID)
//! - Blumenthal key extension for privacy keys longer than the digest
//! - HMAC-96 authentication for message integrity

use digest::{Digest, KeyInit, Mac, OutputSizeUser};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;

/// Localized authentication key.
///
/// A key derived from a password and bound to a specific authoritative
/// engine ID. Key material is zeroed from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive a localized key from a password and engine ID.
    ///
    /// RFC 3414 Section A.2:
    /// 1. Expand the password to 1MB by repetition and hash it (master key)
    /// 2. Hash (master_key || engine_id || master_key) (localized key)
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        let master_key = password_to_key(protocol, password);
        let localized = localize_key(protocol, &master_key, engine_id);
        Self { key: localized, protocol }
    }

    /// Create a localized key from raw bytes.
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), protocol }
    }

    /// Get the protocol this key is for.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Get the MAC length for this key's protocol.
    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// Compute HMAC over a message, truncated to the protocol MAC length.
    pub fn compute_hmac(&self, data: &[u8]) -> Vec<u8> {
        match self.protocol {
            AuthProtocol::Md5 => compute_hmac_md5(&self.key, data, self.mac_len()),
            AuthProtocol::Sha1 => compute_hmac_sha1(&self.key, data, self.mac_len()),
        }
    }

    /// Verify an HMAC in constant time.
    pub fn verify_hmac(&self, data: &[u8], expected: &[u8]) -> bool {
        let computed = self.compute_hmac(data);
        if computed.len() != expected.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in computed.iter().zip(expected.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Password to key transformation (RFC 3414 Section A.2.1).
fn password_to_key(protocol: AuthProtocol, password: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::Md5 => password_to_key_impl::<md5::Md5>(password),
        AuthProtocol::Sha1 => password_to_key_impl::<sha1::Sha1>(password),
    }
}

fn password_to_key_impl<D>(password: &[u8]) -> Vec<u8>
where
    D: Digest + Default,
{
    const EXPANSION_SIZE: usize = 1_048_576; // 1MB

    if password.is_empty() {
        // Empty password results in an all-zero key
        return vec![0u8; <D as OutputSizeUser>::output_size()];
    }

    let mut hasher = D::new();

    // Form a 1MB string by repeating the password, hashed in 64-byte chunks
    let mut buf = [0u8; 64];
    let mut password_index = 0;
    let mut count = 0;

    while count < EXPANSION_SIZE {
        for byte in &mut buf {
            *byte = password[password_index];
            password_index = (password_index + 1) % password.len();
        }
        hasher.update(buf);
        count += 64;
    }

    hasher.finalize().to_vec()
}

/// Key localization (RFC 3414 Section A.2.2).
fn localize_key(protocol: AuthProtocol, master_key: &[u8], engine_id: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::Md5 => localize_key_impl::<md5::Md5>(master_key, engine_id),
        AuthProtocol::Sha1 => localize_key_impl::<sha1::Sha1>(master_key, engine_id),
    }
}

fn localize_key_impl<D>(master_key: &[u8], engine_id: &[u8]) -> Vec<u8>
where
    D: Digest + Default,
{
    let mut hasher = D::new();
    hasher.update(master_key);
    hasher.update(engine_id);
    hasher.update(master_key);
    hasher.finalize().to_vec()
}

/// Extend a localized key to `target_len` bytes.
///
/// Blumenthal extension (draft-blumenthal-aes-usm-04), as used by net-snmp
/// for AES-192/AES-256 with MD5/SHA-1 authentication:
/// `Kul' = Kul || H(Kul) || H(Kul || H(Kul)) || ...`
pub fn extend_key(protocol: AuthProtocol, key: &[u8], target_len: usize) -> Vec<u8> {
    let mut extended = key.to_vec();

    while extended.len() < target_len {
        let digest = match protocol {
            AuthProtocol::Md5 => md5::Md5::digest(&extended).to_vec(),
            AuthProtocol::Sha1 => sha1::Sha1::digest(&extended).to_vec(),
        };
        extended.extend_from_slice(&digest);
    }

    extended.truncate(target_len);
    extended
}

/// Compute HMAC-MD5 and truncate.
fn compute_hmac_md5(key: &[u8], data: &[u8], truncate_len: usize) -> Vec<u8> {
    type HmacMd5 = hmac::Hmac<md5::Md5>;

    let mut mac = <HmacMd5 as KeyInit>::new_from_slice(key).expect("HMAC can take key of any size");
    Mac::update(&mut mac, data);
    let result = mac.finalize().into_bytes();
    result[..truncate_len].to_vec()
}

/// Compute HMAC-SHA1 and truncate.
fn compute_hmac_sha1(key: &[u8], data: &[u8], truncate_len: usize) -> Vec<u8> {
    type HmacSha1 = hmac::Hmac<sha1::Sha1>;

    let mut mac =
        <HmacSha1 as KeyInit>::new_from_slice(key).expect("HMAC can take key of any size");
    Mac::update(&mut mac, data);
    let result = mac.finalize().into_bytes();
    result[..truncate_len].to_vec()
}

/// Authenticate an outgoing message by computing and inserting the HMAC.
///
/// The message must already carry placeholder zeros in the auth params
/// field; the HMAC is computed over the whole message and patched in place.
pub fn authenticate_message(
    key: &LocalizedKey,
    message: &mut [u8],
    auth_offset: usize,
    auth_len: usize,
) {
    let mac = key.compute_hmac(message);
    message[auth_offset..auth_offset + auth_len].copy_from_slice(&mac);
}

/// Verify the authentication of an incoming message.
///
/// Returns `true` if the MAC is valid.
pub fn verify_message(key: &LocalizedKey, message: &[u8], auth_offset: usize, auth_len: usize) -> bool {
    let received_mac = &message[auth_offset..auth_offset + auth_len];

    // HMAC is computed with zeros in the auth params position
    let mut msg_copy = message.to_vec();
    msg_copy[auth_offset..auth_offset + auth_len].fill(0);

    key.verify_hmac(&msg_copy, received_mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex;

    #[test]
    fn test_rfc3414_a3_1_md5_key_localization() {
        // RFC 3414 Appendix A.3.1: password "maplesyrup",
        // engine ID 000000000000000000000002
        let engine_id = hex::decode("000000000000000000000002").unwrap();
        let key = LocalizedKey::from_password(AuthProtocol::Md5, b"maplesyrup", &engine_id);

        assert_eq!(key.as_bytes().len(), 16);
        assert_eq!(hex::encode(key.as_bytes()), "526f5eed9fcce26f8964c2930787d82b");
    }

    #[test]
    fn test_rfc3414_a3_2_sha1_key_localization() {
        // RFC 3414 Appendix A.3.2
        let engine_id = hex::decode("000000000000000000000002").unwrap();
        let key = LocalizedKey::from_password(AuthProtocol::Sha1, b"maplesyrup", &engine_id);

        assert_eq!(key.as_bytes().len(), 20);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "6695febc9288e36282235fc7151f128497b38f3f"
        );
    }

    #[test]
    fn test_hmac_sign_verify_roundtrip() {
        let key = LocalizedKey::from_bytes(AuthProtocol::Sha1, vec![0x42; 20]);
        let mut message = vec![0u8; 64];
        // Zero placeholder at offset 10..22
        authenticate_message(&key, &mut message, 10, 12);

        assert!(verify_message(&key, &message, 10, 12));

        // Flipping any byte invalidates the MAC
        message[0] ^= 0xFF;
        assert!(!verify_message(&key, &message, 10, 12));
    }

    #[test]
    fn test_mac_truncated_to_96_bits() {
        let key = LocalizedKey::from_bytes(AuthProtocol::Md5, vec![1; 16]);
        assert_eq!(key.compute_hmac(b"payload").len(), 12);
    }

    #[test]
    fn test_extend_key_lengths() {
        let key = vec![0xAA; 20];
        let extended = extend_key(AuthProtocol::Sha1, &key, 32);
        assert_eq!(extended.len(), 32);
        assert_eq!(&extended[..20], &key[..]);

        // Already long enough: truncates, never pads with junk
        let same = extend_key(AuthProtocol::Sha1, &extended, 24);
        assert_eq!(same.len(), 24);
        assert_eq!(&same[..], &extended[..24]);
    }

    #[test]
    fn test_empty_password_yields_zero_key() {
        let key = LocalizedKey::from_password(AuthProtocol::Md5, b"", b"engine");
        // localize(H(zero-key) ...) is deterministic but the master is all zeros
        assert_eq!(key.as_bytes().len(), 16);
    }
}
