//! Privacy (encryption) protocols for SNMPv3 (RFC 3414, RFC 3826).
//!
//! - DES-CBC (RFC 3414 Section 8): salt = engineBoots || counter,
//!   IV = pre-IV XOR salt (pre-IV is the last 8 bytes of the 16-byte key)
//! - AES-CFB (RFC 3826): salt = 64-bit counter,
//!   IV = engineBoots || engineTime || salt (concatenation, not XOR)

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::auth::extend_key;
use super::{AuthProtocol, LocalizedKey, PrivProtocol};
use crate::error::{Error, Result};

/// Generate a random non-zero u64 for salt initialization.
fn random_nonzero_u64() -> u64 {
    let mut buf = [0u8; 8];
    loop {
        getrandom::fill(&mut buf).expect("getrandom failed");
        let val = u64::from_ne_bytes(buf);
        if val != 0 {
            return val;
        }
    }
}

/// Thread-safe salt counter shared across encryptions.
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Create a new salt counter seeded from cryptographic randomness.
    pub fn new() -> Self {
        Self(AtomicU64::new(random_nonzero_u64()))
    }

    /// Create a salt counter with a specific value (tests).
    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Get the next salt value.
    ///
    /// Never returns zero: it is skipped on wraparound (matches net-snmp).
    pub fn next(&self) -> u64 {
        let val = self.0.fetch_add(1, Ordering::SeqCst);
        if val == 0 {
            self.0.fetch_add(1, Ordering::SeqCst)
        } else {
            val
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Privacy key for USM encryption/decryption.
///
/// Derived with the same password-to-key algorithm as authentication keys;
/// the protocol decides which portion is used. Key material is zeroed on
/// drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Derive a privacy key from a password and engine ID.
    ///
    /// When the auth protocol's digest is shorter than the privacy key
    /// (MD5/SHA-1 with AES-192/256), the localized key is extended with the
    /// Blumenthal algorithm, matching net-snmp and gosnmp interop behavior.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        priv_protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let localized = LocalizedKey::from_password(auth_protocol, password, engine_id);
        let key = if localized.as_bytes().len() < priv_protocol.key_len() {
            extend_key(auth_protocol, localized.as_bytes(), priv_protocol.key_len())
        } else {
            localized.as_bytes().to_vec()
        };

        Self { key, protocol: priv_protocol }
    }

    /// Create a privacy key from raw localized key bytes.
    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), protocol }
    }

    /// Get the privacy protocol.
    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt data, returning (ciphertext, privParameters).
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt_counter: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        let salt = salt_counter.next();

        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, engine_boots, salt),
            PrivProtocol::Aes128 => self.encrypt_aes(plaintext, engine_boots, engine_time, salt, 16),
            PrivProtocol::Aes192 => self.encrypt_aes(plaintext, engine_boots, engine_time, salt, 24),
            PrivProtocol::Aes256 => self.encrypt_aes(plaintext, engine_boots, engine_time, salt, 32),
        }
    }

    /// Decrypt data using the privParameters from the message.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        if priv_params.len() != 8 {
            tracing::debug!(target: "trapsink::usm", length = priv_params.len(), "invalid privParameters length");
            return Err(Error::DecodeRequest);
        }

        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, priv_params),
            PrivProtocol::Aes128 | PrivProtocol::Aes192 | PrivProtocol::Aes256 => {
                self.decrypt_aes(ciphertext, engine_boots, engine_time, priv_params)
            }
        }
    }

    /// DES-CBC encryption (RFC 3414 Section 8.1.1).
    fn encrypt_des(&self, plaintext: &[u8], engine_boots: u32, salt_int: u64) -> Result<(Bytes, Bytes)> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        type DesCbc = cbc::Encryptor<des::Des>;

        let key = &self.key[..8];
        let pre_iv = &self.key[8..16];

        // Salt = engineBoots (4 bytes MSB) || counter low 32 bits (4 bytes MSB)
        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
        salt[4..].copy_from_slice(&(salt_int as u32).to_be_bytes());

        // IV = pre-IV XOR salt
        let mut iv = [0u8; 8];
        for i in 0..8 {
            iv[i] = pre_iv[i] ^ salt[i];
        }

        // Zero-pad plaintext up to the block size
        let padded_len = plaintext.len().div_ceil(8) * 8;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = DesCbc::new_from_slices(key, &iv).map_err(|_| Error::DecodeRequest)?;
        let ciphertext = cipher
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buffer, padded_len)
            .map_err(|_| Error::DecodeRequest)?;

        Ok((Bytes::copy_from_slice(ciphertext), Bytes::copy_from_slice(&salt)))
    }

    /// DES-CBC decryption (RFC 3414 Section 8.1.1).
    fn decrypt_des(&self, ciphertext: &[u8], priv_params: &[u8]) -> Result<Bytes> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};
        type DesCbc = cbc::Decryptor<des::Des>;

        if !ciphertext.len().is_multiple_of(8) {
            tracing::debug!(target: "trapsink::usm", length = ciphertext.len(), "DES ciphertext not block-aligned");
            return Err(Error::DecodeRequest);
        }

        let key = &self.key[..8];
        let pre_iv = &self.key[8..16];

        // IV = pre-IV XOR salt (salt is the received privParameters)
        let mut iv = [0u8; 8];
        for i in 0..8 {
            iv[i] = pre_iv[i] ^ priv_params[i];
        }

        let cipher = DesCbc::new_from_slices(key, &iv).map_err(|_| Error::DecodeRequest)?;

        let mut buffer = ciphertext.to_vec();
        let plaintext = cipher
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buffer)
            .map_err(|_| Error::DecodeRequest)?;

        Ok(Bytes::copy_from_slice(plaintext))
    }

    /// AES-CFB encryption (RFC 3826 Section 3.1).
    fn encrypt_aes(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: u64,
        key_len: usize,
    ) -> Result<(Bytes, Bytes)> {
        use aes::{Aes128, Aes192, Aes256};
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

        let key = &self.key[..key_len];
        let salt_bytes = salt.to_be_bytes();

        // IV = engineBoots (4) || engineTime (4) || salt (8)
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(&salt_bytes);

        let mut buffer = plaintext.to_vec();

        match key_len {
            16 => {
                let cipher = cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.encrypt(&mut buffer);
            }
            24 => {
                let cipher = cfb_mode::Encryptor::<Aes192>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.encrypt(&mut buffer);
            }
            32 => {
                let cipher = cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.encrypt(&mut buffer);
            }
            _ => return Err(Error::DecodeRequest),
        }

        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt_bytes)))
    }

    /// AES-CFB decryption (RFC 3826 Section 3.1.4).
    fn decrypt_aes(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        use aes::{Aes128, Aes192, Aes256};
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

        let key_len = self.protocol.key_len();
        let key = &self.key[..key_len];

        // IV = engineBoots (4) || engineTime (4) || salt (8)
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(priv_params);

        let mut buffer = ciphertext.to_vec();

        match key_len {
            16 => {
                let cipher = cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.decrypt(&mut buffer);
            }
            24 => {
                let cipher = cfb_mode::Decryptor::<Aes192>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.decrypt(&mut buffer);
            }
            32 => {
                let cipher = cfb_mode::Decryptor::<Aes256>::new_from_slices(key, &iv)
                    .map_err(|_| Error::DecodeRequest)?;
                cipher.decrypt(&mut buffer);
            }
            _ => return Err(Error::DecodeRequest),
        }

        Ok(Bytes::from(buffer))
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_counter_increments() {
        let counter = SaltCounter::from_value(41);
        assert_eq!(counter.next(), 41);
        assert_eq!(counter.next(), 42);
    }

    #[test]
    fn test_salt_counter_skips_zero() {
        let counter = SaltCounter::from_value(0);
        assert_ne!(counter.next(), 0);
    }

    #[test]
    fn test_aes128_roundtrip() {
        let key = PrivKey::from_bytes(PrivProtocol::Aes128, vec![0x11; 16]);
        let counter = SaltCounter::from_value(7);
        let plaintext = b"scoped pdu bytes of arbitrary length";

        let (ciphertext, priv_params) = key.encrypt(plaintext, 3, 1000, &counter).unwrap();
        assert_ne!(ciphertext.as_ref(), plaintext.as_slice());
        assert_eq!(priv_params.len(), 8);

        let decrypted = key.decrypt(&ciphertext, 3, 1000, &priv_params).unwrap();
        assert_eq!(decrypted.as_ref(), plaintext.as_slice());
    }

    #[test]
    fn test_aes256_roundtrip_with_extended_key() {
        // SHA-1 digest (20 bytes) must be extended to 32 for AES-256
        let key = PrivKey::from_password(
            AuthProtocol::Sha1,
            PrivProtocol::Aes256,
            b"privpassword",
            b"engine-0001",
        );
        let counter = SaltCounter::from_value(1);
        let plaintext = b"authPriv payload";

        let (ciphertext, priv_params) = key.encrypt(plaintext, 1, 2, &counter).unwrap();
        let decrypted = key.decrypt(&ciphertext, 1, 2, &priv_params).unwrap();
        assert_eq!(decrypted.as_ref(), plaintext.as_slice());
    }

    #[test]
    fn test_des_roundtrip_pads_to_block() {
        let key = PrivKey::from_bytes(PrivProtocol::Des, vec![0x22; 16]);
        let counter = SaltCounter::from_value(9);
        let plaintext = b"not a multiple of eight";

        let (ciphertext, priv_params) = key.encrypt(plaintext, 5, 0, &counter).unwrap();
        assert!(ciphertext.len().is_multiple_of(8));
        assert!(ciphertext.len() >= plaintext.len());

        // Zero padding survives decryption; the BER length inside the
        // plaintext makes the tail unambiguous for the caller.
        let decrypted = key.decrypt(&ciphertext, 5, 0, &priv_params).unwrap();
        assert_eq!(&decrypted[..plaintext.len()], plaintext.as_slice());
    }

    #[test]
    fn test_decrypt_rejects_bad_priv_params() {
        let key = PrivKey::from_bytes(PrivProtocol::Aes128, vec![0x11; 16]);
        assert!(key.decrypt(b"12345678", 0, 0, b"short").is_err());
    }

    #[test]
    fn test_des_rejects_unaligned_ciphertext() {
        let key = PrivKey::from_bytes(PrivProtocol::Des, vec![0x11; 16]);
        assert!(key.decrypt(b"123456789", 0, 0, b"12345678").is_err());
    }

    #[test]
    fn test_wrong_key_garbles_plaintext() {
        let key_a = PrivKey::from_bytes(PrivProtocol::Aes128, vec![0xAA; 16]);
        let key_b = PrivKey::from_bytes(PrivProtocol::Aes128, vec![0xBB; 16]);
        let counter = SaltCounter::from_value(3);

        let (ciphertext, priv_params) = key_a.encrypt(b"plaintext", 0, 0, &counter).unwrap();
        let garbled = key_b.decrypt(&ciphertext, 0, 0, &priv_params).unwrap();
        assert_ne!(garbled.as_ref(), b"plaintext".as_slice());
    }
}
