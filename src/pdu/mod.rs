//! SNMP Protocol Data Units (PDUs).
//!
//! The trap core decodes every PDU type (the acceptance policy is enforced
//! by the engines, not the codec) and encodes the GetResponse used to
//! acknowledge Inform requests.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    GetResponse = 0xA2,
    SetRequest = 0xA3,
    TrapV1 = 0xA4,
    GetBulkRequest = 0xA5,
    InformRequest = 0xA6,
    TrapV2 = 0xA7,
    Report = 0xA8,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::GetResponse),
            0xA3 => Some(Self::SetRequest),
            0xA4 => Some(Self::TrapV1),
            0xA5 => Some(Self::GetBulkRequest),
            0xA6 => Some(Self::InformRequest),
            0xA7 => Some(Self::TrapV2),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Check if this is a notification PDU (Trap or Inform).
    pub fn is_notification(self) -> bool {
        matches!(self, Self::TrapV1 | Self::TrapV2 | Self::InformRequest)
    }

    /// Check if this is a read/write management PDU.
    pub fn is_management(self) -> bool {
        matches!(
            self,
            Self::GetRequest | Self::GetNextRequest | Self::GetBulkRequest | Self::SetRequest
        )
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::GetResponse => write!(f, "GetResponse"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::TrapV1 => write!(f, "TrapV1"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::InformRequest => write!(f, "InformRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Generic PDU structure shared by every operation except the v1 Trap.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type
    pub pdu_type: PduType,
    /// Request ID for correlating requests and responses
    pub request_id: i32,
    /// Error status (0 for requests; non-repeaters for GETBULK)
    pub error_status: i32,
    /// Error index (0 for requests; max-repetitions for GETBULK)
    pub error_index: i32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a new PDU of the given type with empty error fields.
    pub fn new(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Create a GET request PDU (used by the policy tests).
    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::new(
            PduType::GetRequest,
            request_id,
            oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        )
    }

    /// Create the GetResponse acknowledging an Inform request.
    ///
    /// Echoes the request id, carries error = 0, error-index = 0 and an
    /// empty varbind list.
    pub fn inform_response(&self) -> Self {
        Self {
            pdu_type: PduType::GetResponse,
            request_id: self.request_id,
            error_status: 0,
            error_index: 0,
            varbinds: Vec::new(),
        }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag).ok_or_else(|| {
            tracing::debug!(target: "trapsink::ber", offset = decoder.offset(), tag, "unknown PDU tag");
            Error::malformed(decoder.offset())
        })?;

        let len = decoder.read_length()?;
        let mut pdu = decoder.sub_decoder(len)?;

        let request_id = pdu.read_integer()?;
        let error_status = pdu.read_integer()?;
        let error_index = pdu.read_integer()?;
        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

/// SNMPv1 Trap PDU (RFC 1157 Section 4.1.6).
///
/// This PDU type has a completely different structure from other PDUs and
/// only appears in SNMPv1.
#[derive(Debug, Clone)]
pub struct TrapV1Pdu {
    /// Enterprise OID (sysObjectID of the entity generating the trap)
    pub enterprise: Oid,
    /// Agent address (IP of the agent generating the trap)
    pub agent_addr: [u8; 4],
    /// Generic trap type (0-5 standard, 6 enterprise-specific)
    pub generic_trap: i32,
    /// Specific trap code (meaningful when generic_trap is 6)
    pub specific_trap: i32,
    /// Time since the entity was last (re)initialized, in hundredths of seconds
    pub time_stamp: u32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl TrapV1Pdu {
    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(tag::pdu::TRAP_V1, |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_unsigned32(tag::application::TIMETICKS, self.time_stamp);
            buf.push_integer(self.specific_trap);
            buf.push_integer(self.generic_trap);
            // NetworkAddress is APPLICATION 0 IMPLICIT IpAddress
            buf.push_ip_address(self.agent_addr);
            buf.push_oid(&self.enterprise);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut pdu = decoder.read_constructed(tag::pdu::TRAP_V1)?;

        let enterprise = pdu.read_oid()?;

        let agent_len = pdu.expect_tag(tag::application::IP_ADDRESS)?;
        if agent_len != 4 {
            tracing::debug!(target: "trapsink::ber", offset = pdu.offset(), length = agent_len, "agent address must be 4 bytes");
            return Err(Error::malformed(pdu.offset()));
        }
        let agent_bytes = pdu.read_bytes(4)?;
        let agent_addr = [agent_bytes[0], agent_bytes[1], agent_bytes[2], agent_bytes[3]];

        let generic_trap = pdu.read_integer()?;
        let specific_trap = pdu.read_integer()?;

        let ts_len = pdu.expect_tag(tag::application::TIMETICKS)?;
        let time_stamp = pdu.read_unsigned32_value(ts_len)?;

        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(TrapV1Pdu {
            enterprise,
            agent_addr,
            generic_trap,
            specific_trap,
            time_stamp,
            varbinds,
        })
    }
}
