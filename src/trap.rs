//! Normalized trap record handed to the downstream processing stage.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::pdu::PduType;
use crate::version::Version;

/// A processed SNMP trap/inform message.
///
/// This is the record the handler emits onto the egress queue. The
/// standardized fields at the bottom are reserved for downstream
/// enrichment and left empty by the core.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrapMessage {
    /// When the trap was received.
    pub received_at: DateTime<Utc>,
    /// When processing started.
    pub processed_at: DateTime<Utc>,

    /// Source IP address.
    pub source_ip: IpAddr,
    /// Source port.
    pub source_port: u16,
    /// bmc, switch, machine-agent, etc. Populated downstream.
    pub agent_type: String,
    /// Source hostname if available. Populated downstream.
    pub hostname: String,

    /// SNMP version.
    pub version: Version,
    /// Community string (v1/v2c).
    pub community: String,
    /// Security model label (v3): noAuthNoPriv, authNoPriv, authPriv.
    pub security_model: String,
    /// Security user name (v3).
    pub user_name: String,
    /// PDU type (Trap, Inform, ...).
    pub pdu_type: PduType,
    /// Request ID, echoed in the response when one is required.
    pub request_id: i32,

    /// Enterprise OID (v1 only).
    pub v1_enterprise_oid: String,
    /// Generic trap type (v1 only).
    pub v1_generic_trap: i32,
    /// Specific trap type (v1 only).
    pub v1_specific_trap: i32,

    /// sysUpTime when the trap was generated (v2c/v3 only).
    pub v2c_v3_timestamp: u32,

    /// OID -> stringified value mapping for every binding in the PDU.
    pub variable_map: HashMap<String, String>,

    /// Original raw packet bytes, retained for audit.
    #[serde(skip)]
    pub raw_data: bytes::Bytes,
    /// Whether this message needs a response (Inform).
    pub needs_response: bool,

    /// Standardized alert type. Populated downstream.
    pub alert_type: String,
    /// Standardized severity level. Populated downstream.
    pub severity: String,
    /// Affected component. Populated downstream.
    pub component: String,
    /// Human readable message. Populated downstream.
    pub message: String,
    /// Hardware serial number. Populated downstream.
    pub serial_number: String,
}
