//! Conversion of decoded packets into normalized trap records.
//!
//! Trap sources in the field are sloppy about binding types, so every
//! extraction here coerces defensively: wrong types degrade to defaults
//! with a warning instead of dropping the trap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::engine::DecodedPacket;
use crate::packet::RawPacket;
use crate::pdu::PduType;
use crate::trap::TrapMessage;
use crate::value::Value;
use crate::version::Version;

/// Minimum binding count for a v1 trap to carry its header fields.
const V1_HEADER_BINDINGS: usize = 4;

/// Convert a decoded packet into the normalized record for downstream.
pub(crate) fn to_trap_message(
    decoded: &DecodedPacket,
    raw: &RawPacket,
    received_at: DateTime<Utc>,
) -> TrapMessage {
    let mut trap = TrapMessage {
        received_at,
        processed_at: Utc::now(),
        source_ip: raw.source.ip(),
        source_port: raw.source.port(),
        agent_type: String::new(),
        hostname: String::new(),
        version: decoded.version,
        community: String::from_utf8_lossy(&decoded.community).into_owned(),
        security_model: String::new(),
        user_name: String::new(),
        pdu_type: decoded.pdu_type,
        request_id: decoded.request_id,
        v1_enterprise_oid: String::new(),
        v1_generic_trap: 0,
        v1_specific_trap: 0,
        v2c_v3_timestamp: 0,
        variable_map: HashMap::with_capacity(decoded.bindings.len()),
        raw_data: raw.data.clone(),
        needs_response: decoded.pdu_type == PduType::InformRequest,
        alert_type: String::new(),
        severity: String::new(),
        component: String::new(),
        message: String::new(),
        serial_number: String::new(),
    };

    match decoded.version {
        Version::V1 => extract_v1_fields(&mut trap, decoded),
        Version::V2c | Version::V3 => extract_uptime(&mut trap, decoded),
    }

    // Duplicates are not expected in well-formed packets; last writer wins.
    for binding in &decoded.bindings {
        trap.variable_map
            .insert(binding.oid.to_string(), binding.value.to_string());
    }

    if decoded.version == Version::V3 {
        extract_v3_security(&mut trap, decoded);
    }

    trap
}

/// Extract enterprise OID and generic/specific trap numbers from the
/// leading v1 bindings.
fn extract_v1_fields(trap: &mut TrapMessage, decoded: &DecodedPacket) {
    if decoded.bindings.len() < V1_HEADER_BINDINGS {
        tracing::warn!(
            target: "trapsink::handler",
            binding_count = decoded.bindings.len(),
            source = %trap.source_ip,
            "v1 packet has insufficient bindings, using defaults"
        );
        return;
    }

    trap.v1_enterprise_oid = match &decoded.bindings[0].value {
        Value::OctetString(bytes) | Value::Opaque(bytes) => bytes_to_decimal(bytes),
        Value::ObjectIdentifier(oid) => oid.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => v.to_string(),
        Value::Counter64(v) => v.to_string(),
        Value::Null => {
            tracing::warn!(target: "trapsink::handler", source = %trap.source_ip, "v1 enterprise OID is nil");
            String::new()
        }
        other => {
            tracing::warn!(
                target: "trapsink::handler",
                value = %other,
                "unexpected v1 enterprise OID type, using string form"
            );
            other.to_string()
        }
    };

    trap.v1_generic_trap = coerce_trap_number(&decoded.bindings[2].value, "generic");
    trap.v1_specific_trap = coerce_trap_number(&decoded.bindings[3].value, "specific");
}

fn coerce_trap_number(value: &Value, which: &str) -> i32 {
    match value {
        Value::Integer(v) => *v,
        Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => *v as i32,
        Value::Null => 0,
        other => {
            tracing::warn!(
                target: "trapsink::handler",
                value = %other,
                "unexpected v1 {which} trap type, defaulting to 0"
            );
            0
        }
    }
}

/// Take sysUpTime from binding [0] of a v2c/v3 notification.
///
/// Some vendors do not follow the sysUpTime-first convention, so every
/// shape is tolerated.
fn extract_uptime(trap: &mut TrapMessage, decoded: &DecodedPacket) {
    let Some(first) = decoded.bindings.first() else {
        tracing::warn!(
            target: "trapsink::handler",
            source = %trap.source_ip,
            version = %decoded.version,
            "packet has no bindings, timestamp will be 0"
        );
        return;
    };

    trap.v2c_v3_timestamp = match &first.value {
        Value::TimeTicks(v) | Value::Counter32(v) | Value::Gauge32(v) => *v,
        Value::Counter64(v) => {
            if *v > u32::MAX as u64 {
                tracing::warn!(target: "trapsink::handler", value = v, "sysUpTime exceeds u32 range, saturating");
                u32::MAX
            } else {
                *v as u32
            }
        }
        Value::Integer(v) => {
            if *v < 0 {
                tracing::warn!(target: "trapsink::handler", value = v, "sysUpTime is negative, using 0");
                0
            } else {
                *v as u32
            }
        }
        Value::Null => {
            tracing::warn!(target: "trapsink::handler", "sysUpTime value is nil, using 0");
            0
        }
        other => {
            tracing::warn!(
                target: "trapsink::handler",
                value = %other,
                "unexpected sysUpTime type, defaulting to 0"
            );
            0
        }
    };
}

/// Derive the security-model label and user name from v3 parameters.
fn extract_v3_security(trap: &mut TrapMessage, decoded: &DecodedPacket) {
    let Some(security) = &decoded.security else {
        tracing::debug!(target: "trapsink::handler", "v3 security parameters missing");
        return;
    };

    trap.security_model = match security.msg_flags & 0x03 {
        0b00 => "noAuthNoPriv".to_string(),
        0b01 => "authNoPriv".to_string(),
        0b11 => "authPriv".to_string(),
        other => {
            tracing::warn!(target: "trapsink::handler", msg_flags = other, "unknown v3 security level");
            format!("Unknown({other})")
        }
    };

    trap.user_name = String::from_utf8_lossy(&security.user_name).into_owned();
}

/// Render a byte string as an unsigned big-endian decimal integer.
fn bytes_to_decimal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }

    // Repeated division by 10 over base-256 digits
    let mut digits: Vec<u8> = bytes.to_vec();
    let mut decimal = Vec::new();

    while digits.iter().any(|&d| d != 0) {
        let mut remainder: u32 = 0;
        for digit in digits.iter_mut() {
            let value = (remainder << 8) | (*digit as u32);
            *digit = (value / 10) as u8;
            remainder = value % 10;
        }
        decimal.push(b'0' + remainder as u8);
    }

    if decimal.is_empty() {
        return "0".to_string();
    }

    decimal.reverse();
    String::from_utf8(decimal).expect("decimal digits are ASCII")
}
