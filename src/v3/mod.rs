//! SNMPv3 User-based Security Model (USM) support.
//!
//! This module implements what the engines delegate to:
//!
//! - USM security parameters encoding/decoding
//! - Key localization (password-to-key derivation, RFC 3414)
//! - Authentication (HMAC-MD5-96, HMAC-SHA-96)
//! - Privacy (DES-CBC per RFC 3414, AES-CFB per RFC 3826)
//!
//! The engines configure this layer once and call it per packet; they never
//! hash or cipher themselves.

pub mod auth;
mod privacy;
mod usm;

pub use auth::LocalizedKey;
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

use crate::error::Error;

/// Authentication protocol identifiers.
///
/// The configuration surface admits the two RFC 3414 protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
}

impl AuthProtocol {
    /// Digest output length in bytes; also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Truncated MAC length for msgAuthenticationParameters (HMAC-96).
    pub fn mac_len(self) -> usize {
        12
    }
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "MD5" => Ok(Self::Md5),
            "SHA" => Ok(Self::Sha1),
            _ => Err(Error::config(format!("invalid auth_protocol: {s}"))),
        }
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
    /// AES-192-CFB (RFC 3826 extension)
    Aes192,
    /// AES-256-CFB (RFC 3826 extension)
    Aes256,
}

impl PrivProtocol {
    /// Required key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Des => 16, // 8 key + 8 pre-IV
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Salt (msgPrivacyParameters) length in bytes.
    pub fn salt_len(self) -> usize {
        8
    }
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
            Self::Aes192 => write!(f, "AES192"),
            Self::Aes256 => write!(f, "AES256"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "DES" => Ok(Self::Des),
            "AES" => Ok(Self::Aes128),
            "AES192" => Ok(Self::Aes192),
            "AES256" => Ok(Self::Aes256),
            _ => Err(Error::config(format!("invalid priv_protocol: {s}"))),
        }
    }
}
