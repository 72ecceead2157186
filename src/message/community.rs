//! Community-based SNMP message format (v1/v2c).
//!
//! V1 and V2c messages share the same structure:
//! `SEQUENCE { version INTEGER, community OCTET STRING, pdu PDU }`
//!
//! The only difference is the version number (0 for v1, 1 for v2c).

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{Error, Result};
use crate::pdu::{Pdu, TrapV1Pdu};
use crate::version::Version;

/// The PDU carried by a community message.
///
/// The v1 Trap has its own wire structure, so it gets its own variant
/// instead of being forced into the generic shape.
#[derive(Debug, Clone)]
pub enum CommunityPdu {
    /// Any request/response-shaped PDU (including SNMPv2-Trap and Inform).
    Pdu(Pdu),
    /// SNMPv1 Trap.
    TrapV1(TrapV1Pdu),
}

/// Community-based SNMP message (v1/v2c).
#[derive(Debug, Clone)]
pub struct CommunityMessage {
    /// SNMP version (V1 or V2c)
    pub version: Version,
    /// Community string
    pub community: Bytes,
    /// Protocol data unit
    pub pdu: CommunityPdu,
}

impl CommunityMessage {
    /// Create a v2c message wrapping a generic PDU.
    pub fn v2c(community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version: Version::V2c,
            community: community.into(),
            pdu: CommunityPdu::Pdu(pdu),
        }
    }

    /// Parse only the community octet string from a raw v1/v2c datagram.
    ///
    /// The engines select a per-community decoder before fully decoding,
    /// so this reads `SEQUENCE { version, community, … }` and stops.
    pub fn peek_community(data: &Bytes) -> Result<Bytes> {
        let mut decoder = Decoder::new(data.clone());
        let mut seq = decoder.read_sequence()?;
        let _version = seq.read_integer()?;
        seq.read_octet_string()
    }

    /// Encode to BER.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();

        buf.push_sequence(|buf| {
            match &self.pdu {
                CommunityPdu::Pdu(pdu) => pdu.encode(buf),
                CommunityPdu::TrapV1(trap) => trap.encode(buf),
            }
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });

        buf.finish()
    }

    /// Decode from BER.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let version_num = seq.read_integer()?;
        let version = match Version::from_i32(version_num) {
            Some(Version::V3) | None => {
                tracing::debug!(target: "trapsink::ber", version = version_num, "not a community message");
                return Err(Error::malformed(seq.offset()));
            }
            Some(v) => v,
        };

        let community = seq.read_octet_string()?;

        let pdu = match seq.peek_tag() {
            Some(tag::pdu::TRAP_V1) => CommunityPdu::TrapV1(TrapV1Pdu::decode(&mut seq)?),
            Some(_) => CommunityPdu::Pdu(Pdu::decode(&mut seq)?),
            None => return Err(Error::malformed(seq.offset())),
        };

        Ok(CommunityMessage {
            version,
            community,
            pdu,
        })
    }
}
