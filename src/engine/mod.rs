//! Version-dispatched protocol engines and the response manager.
//!
//! The response manager sniffs the SNMP version from the raw bytes, routes
//! the datagram to the engine registered for that version, and enforces the
//! enable flag. Engines parse the datagram, validate credentials, transmit
//! an acknowledgement when the PDU is confirmable, and hand back a
//! [`DecodedPacket`] for normalization.

mod community;
mod identity;
mod v3;

pub use community::{CommunityEngine, CommunitySecurity};
pub use v3::V3Engine;

use std::collections::HashMap;

use bytes::Bytes;

use crate::config::EngineSetConfig;
use crate::error::{Error, Result};
use crate::message::sniff_version;
use crate::packet::RawPacket;
use crate::pdu::PduType;
use crate::varbind::VarBind;
use crate::version::Version;

/// Well-known OIDs used when flattening notifications.
pub mod oids {
    use crate::oid;
    use crate::oid::Oid;

    /// sysUpTime.0 - first varbind in v2c/v3 notifications
    pub fn sys_uptime() -> Oid {
        oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
    }

    /// snmpTrapOID.0 - trap type identifier in v2c/v3 notifications
    pub fn snmp_trap_oid() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0)
    }

    /// snmpTrapEnterprise.0 - enterprise OID (RFC 3584)
    pub fn snmp_trap_enterprise() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 3, 0)
    }

    /// snmpTrapAddress.0 - originating agent address (RFC 3584)
    pub fn snmp_trap_address() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 18, 1, 3, 0)
    }

    /// Local instance carrying the v1 generic-trap field.
    pub fn v1_generic_trap() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 18, 1, 5, 0)
    }

    /// Local instance carrying the v1 specific-trap field.
    pub fn v1_specific_trap() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 18, 1, 6, 0)
    }
}

/// v3 security information attached to a decoded packet.
#[derive(Debug, Clone)]
pub struct V3SecurityInfo {
    /// Raw msgFlags byte as received.
    pub msg_flags: u8,
    /// USM user name.
    pub user_name: Bytes,
    /// Authoritative engine ID.
    pub engine_id: Bytes,
}

/// The result of protocol parsing, handed to the normalizer.
///
/// The binding list is flat across versions. For v1 Traps the five header
/// fields lead the list in wire order (enterprise, agent address, generic,
/// specific, time-stamp) ahead of the PDU's own varbinds; for v2c/v3 the
/// list is the PDU varbinds verbatim.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    /// Protocol version.
    pub version: Version,
    /// PDU type.
    pub pdu_type: PduType,
    /// Request identifier (0 for v1 Traps, which carry none).
    pub request_id: i32,
    /// Community string (empty for v3).
    pub community: Bytes,
    /// Security parameters (v3 only).
    pub security: Option<V3SecurityInfo>,
    /// Ordered variable bindings.
    pub bindings: Vec<VarBind>,
}

/// One protocol engine per supported version.
///
/// Dispatch is an exhaustive match on the variant; the factory guarantees
/// at most one engine per version.
pub enum Engine {
    /// Community-based v1/v2c engine.
    Community(CommunityEngine),
    /// USM-based v3 engine.
    V3(V3Engine),
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Community(e) => f.debug_tuple("Community").field(e).finish(),
            Engine::V3(e) => f.debug_tuple("V3").field(e).finish(),
        }
    }
}

impl Engine {
    /// Whether this engine accepts traffic.
    pub fn enabled(&self) -> bool {
        match self {
            Engine::Community(e) => e.enabled(),
            Engine::V3(e) => e.enabled(),
        }
    }

    /// The version this engine serves.
    pub fn version(&self) -> Version {
        match self {
            Engine::Community(e) => e.version(),
            Engine::V3(_) => Version::V3,
        }
    }

    /// Engine identity string (logging/tracking only for v1/v2c).
    pub fn engine_id(&self) -> &str {
        match self {
            Engine::Community(e) => e.engine_id(),
            Engine::V3(e) => e.engine_id(),
        }
    }

    /// Parse, authenticate and acknowledge one datagram.
    pub async fn process(&self, raw: &RawPacket) -> Result<DecodedPacket> {
        match self {
            Engine::Community(e) => e.process(raw).await,
            Engine::V3(e) => e.process(raw).await,
        }
    }
}

/// Engine factory: builds and owns at most one engine per version.
pub struct EngineSet {
    engines: HashMap<Version, Engine>,
}

impl std::fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSet").field("engines", &self.engines).finish()
    }
}

impl EngineSet {
    /// Build the engine set from configuration.
    ///
    /// A present config always registers an engine, enabled or not; the
    /// disabled state is a distinct diagnostic from an absent version.
    /// Invalid engine configuration is a construction-time fatal error.
    pub fn from_config(config: &EngineSetConfig) -> Result<Self> {
        let mut engines = HashMap::new();

        if let Some(v1) = &config.v1 {
            engines.insert(
                Version::V1,
                Engine::Community(CommunityEngine::new(Version::V1, v1)?),
            );
        }
        if let Some(v2c) = &config.v2c {
            engines.insert(
                Version::V2c,
                Engine::Community(CommunityEngine::new(Version::V2c, v2c)?),
            );
        }
        if let Some(v3) = &config.v3 {
            engines.insert(Version::V3, Engine::V3(V3Engine::new(v3)?));
        }

        Ok(Self { engines })
    }

    /// Look up the engine for a version.
    pub fn engine_for(&self, version: Version) -> Result<&Engine> {
        self.engines.get(&version).ok_or(Error::UnsupportedVersion)
    }
}

/// Routes raw datagrams to the engine for their version.
pub struct ResponseManager {
    factory: EngineSet,
}

impl std::fmt::Debug for ResponseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseManager").field("factory", &self.factory).finish()
    }
}

impl ResponseManager {
    /// Build the manager and its engine set from configuration.
    pub fn new(config: &EngineSetConfig) -> Result<Self> {
        Ok(Self { factory: EngineSet::from_config(config)? })
    }

    /// Decode one datagram and transmit a response if the PDU requires one.
    ///
    /// Sniffs only the version from the outer sequence, then delegates to
    /// the matching engine. The engine must exist and be enabled.
    pub async fn respond(&self, raw: &RawPacket) -> Result<DecodedPacket> {
        if raw.data.is_empty() {
            return Err(Error::NilRequest);
        }

        let version = sniff_version(&raw.data)?;
        let engine = self.factory.engine_for(version)?;
        if !engine.enabled() {
            return Err(Error::DisabledVersion);
        }

        engine.process(raw).await
    }
}
