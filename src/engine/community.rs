//! Community-based response engine (SNMPv1 / SNMPv2c).
//!
//! The engine exists to ingest notifications, not to serve management
//! requests: Get/GetNext/GetBulk/Set are rejected by policy regardless of
//! community. v1 accepts Trap only; v2c accepts SNMPv2-Trap and
//! InformRequest, and Informs are acknowledged with a GetResponse.

use bytes::Bytes;

use super::identity::generate_engine_id;
use super::{DecodedPacket, oids};
use crate::config::CommunityEngineConfig;
use crate::error::{Error, Result};
use crate::message::{CommunityMessage, CommunityPdu};
use crate::packet::RawPacket;
use crate::pdu::{Pdu, PduType, TrapV1Pdu};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Community-string security model for v1/v2c.
#[derive(Debug, Clone)]
pub struct CommunitySecurity {
    read_community: Bytes,
    read_write_community: Bytes,
}

impl CommunitySecurity {
    /// Create the model from the two configured communities.
    pub fn new(read_community: impl Into<Bytes>, read_write_community: impl Into<Bytes>) -> Self {
        Self {
            read_community: read_community.into(),
            read_write_community: read_write_community.into(),
        }
    }

    /// Authenticate a decoded packet against the community policy.
    ///
    /// Read-class PDUs require either community, Set requires the
    /// read/write community, notifications require version consistency.
    pub fn authenticate(&self, version: Version, pdu_type: PduType, community: &Bytes) -> Result<()> {
        if community.is_empty() {
            return Err(Error::EmptyCommunity);
        }

        match pdu_type {
            PduType::GetRequest | PduType::GetNextRequest | PduType::GetBulkRequest => {
                if community != &self.read_community && community != &self.read_write_community {
                    return Err(Error::InvalidCommunity);
                }
                Ok(())
            }
            PduType::SetRequest => {
                if community != &self.read_write_community {
                    return Err(Error::InvalidCommunity);
                }
                Ok(())
            }
            PduType::InformRequest => Ok(()),
            PduType::TrapV1 => {
                if version != Version::V1 {
                    return Err(Error::VersionMismatch);
                }
                Ok(())
            }
            PduType::TrapV2 => {
                if version != Version::V2c {
                    return Err(Error::VersionMismatch);
                }
                Ok(())
            }
            _ => Err(Error::UnsupportedPduType),
        }
    }

    /// Coarse operation-level access policy.
    ///
    /// Secondary defense behind the engine's PDU-type gate: traps are
    /// always allowed, v2c Informs are allowed, everything else is denied.
    pub fn check_access(&self, version: Version, operation: PduType) -> bool {
        if operation == PduType::TrapV1 || operation == PduType::TrapV2 {
            return true;
        }
        if operation == PduType::InformRequest && version == Version::V2c {
            return true;
        }
        false
    }
}

/// SNMPv1/v2c response engine.
#[derive(Debug)]
pub struct CommunityEngine {
    enabled: bool,
    version: Version,
    engine_id: String,
    security: CommunitySecurity,
    // The per-community decoder set; a datagram whose community is not
    // here is rejected before full decode.
    communities: Vec<Bytes>,
}

impl CommunityEngine {
    /// Build the engine from configuration.
    ///
    /// An enabled engine without both communities is a fatal
    /// configuration error.
    pub fn new(version: Version, config: &CommunityEngineConfig) -> Result<Self> {
        if config.enabled
            && (config.read_community.is_empty() || config.read_write_community.is_empty())
        {
            return Err(Error::config(format!(
                "cannot enable {version} engine without read and read/write communities"
            )));
        }

        let read = Bytes::from(config.read_community.clone().into_bytes());
        let read_write = Bytes::from(config.read_write_community.clone().into_bytes());

        Ok(Self {
            enabled: config.enabled,
            version,
            engine_id: generate_engine_id(version),
            security: CommunitySecurity::new(read.clone(), read_write.clone()),
            communities: vec![read, read_write],
        })
    }

    /// Whether this engine accepts traffic.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The version this engine serves.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Engine identity string (logging/tracking only).
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Security model handle.
    pub fn security(&self) -> &CommunitySecurity {
        &self.security
    }

    /// PDU-type acceptance policy; the canonical ingestion gate.
    fn can_process(&self, pdu_type: PduType) -> bool {
        match self.version {
            Version::V1 => pdu_type == PduType::TrapV1,
            Version::V2c => matches!(pdu_type, PduType::TrapV2 | PduType::InformRequest),
            Version::V3 => false,
        }
    }

    /// Build the GetResponse acknowledging an Inform.
    fn create_inform_response(&self, request: &Pdu, community: &Bytes) -> Result<CommunityMessage> {
        match self.version {
            Version::V1 => Err(Error::V1InformNotSupported),
            Version::V2c => Ok(CommunityMessage::v2c(community.clone(), request.inform_response())),
            Version::V3 => Err(Error::InvalidInformRequest),
        }
    }

    /// Process one datagram: parse community, decode, gate, authenticate,
    /// acknowledge if confirmable, and return the decoded packet.
    pub async fn process(&self, raw: &RawPacket) -> Result<DecodedPacket> {
        let community =
            CommunityMessage::peek_community(&raw.data).map_err(|_| Error::DecodeRequest)?;

        if community.is_empty() {
            return Err(Error::EmptyCommunity);
        }
        if !self.communities.contains(&community) {
            return Err(Error::InvalidCommunity);
        }

        let message = CommunityMessage::decode(raw.data.clone()).map_err(|e| {
            tracing::debug!(target: "trapsink::engine", source = %raw.source, error = %e, "community message decode failed");
            Error::DecodeRequest
        })?;

        match message.pdu {
            CommunityPdu::TrapV1(trap) => {
                if !self.can_process(PduType::TrapV1) {
                    return Err(Error::UnsupportedPduType);
                }
                self.security
                    .authenticate(message.version, PduType::TrapV1, &message.community)?;

                Ok(DecodedPacket {
                    version: message.version,
                    pdu_type: PduType::TrapV1,
                    request_id: 0,
                    community: message.community,
                    security: None,
                    bindings: flatten_v1_trap(trap),
                })
            }
            CommunityPdu::Pdu(pdu) => {
                if !self.can_process(pdu.pdu_type) {
                    return Err(Error::UnsupportedPduType);
                }
                self.security
                    .authenticate(message.version, pdu.pdu_type, &message.community)?;

                if pdu.pdu_type == PduType::InformRequest {
                    let response = self.create_inform_response(&pdu, &message.community)?;
                    raw.reply(&response.encode()).await?;
                    tracing::debug!(target: "trapsink::engine", source = %raw.source, request_id = pdu.request_id, "sent Inform response");
                }

                Ok(DecodedPacket {
                    version: message.version,
                    pdu_type: pdu.pdu_type,
                    request_id: pdu.request_id,
                    community: message.community,
                    security: None,
                    bindings: pdu.varbinds,
                })
            }
        }
    }
}

/// Surface the v1 trap header as the leading bindings, in wire order,
/// ahead of the PDU's own varbinds.
fn flatten_v1_trap(trap: TrapV1Pdu) -> Vec<VarBind> {
    let mut bindings = Vec::with_capacity(5 + trap.varbinds.len());
    bindings.push(VarBind::new(
        oids::snmp_trap_enterprise(),
        Value::ObjectIdentifier(trap.enterprise),
    ));
    bindings.push(VarBind::new(
        oids::snmp_trap_address(),
        Value::IpAddress(trap.agent_addr),
    ));
    bindings.push(VarBind::new(oids::v1_generic_trap(), Value::Integer(trap.generic_trap)));
    bindings.push(VarBind::new(
        oids::v1_specific_trap(),
        Value::Integer(trap.specific_trap),
    ));
    bindings.push(VarBind::new(oids::sys_uptime(), Value::TimeTicks(trap.time_stamp)));
    bindings.extend(trap.varbinds);
    bindings
}
