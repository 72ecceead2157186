//! SNMP message wrappers.
//!
//! Messages encapsulate PDUs with version and authentication information:
//!
//! - [`CommunityMessage`] - v1/v2c messages with community string auth
//! - [`V3Message`] - v3 messages with USM security
//!
//! [`sniff_version`] reads only the outer `SEQUENCE { INTEGER version, … }`
//! so the dispatcher can pick an engine without decoding the whole datagram.

mod community;
mod v3;

pub use community::{CommunityMessage, CommunityPdu};
pub use v3::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message, V3MessageData};

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::{Error, Result};
use crate::version::Version;

/// Extract the SNMP version from a raw datagram without a full decode.
///
/// Any structural failure in the outer sequence or the version integer is
/// reported as [`Error::ParseVersion`]; a structurally valid integer outside
/// {0, 1, 3} is [`Error::IllegalVersion`].
pub fn sniff_version(data: &Bytes) -> Result<Version> {
    let mut decoder = Decoder::new(data.clone());
    let mut seq = decoder.read_sequence().map_err(|_| Error::ParseVersion)?;
    let version_num = seq.read_integer().map_err(|_| Error::ParseVersion)?;

    Version::from_i32(version_num).ok_or(Error::IllegalVersion(version_num))
}
