//! Engine identity generation.
//!
//! Non-cryptographic synthetic identifiers. For v3 the id is hex-encoded
//! and held to the 5-32 byte range RFC 3411 allows for snmpEngineID; for
//! v1/v2c it is a human-readable tag used in logs only.

use rand::Rng;

use crate::util::hex;
use crate::version::Version;

/// Generate an engine identity for the given version.
pub(crate) fn generate_engine_id(version: Version) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    match version {
        Version::V3 => {
            let random: [u8; 8] = rand::rng().random();
            let mut data = format!("v3-engine-{}-{}", timestamp, hex::encode(&random));
            // RFC 3411 caps snmpEngineID at 32 bytes
            data.truncate(32);
            hex::encode(data.as_bytes())
        }
        Version::V1 => {
            let random: [u8; 4] = rand::rng().random();
            format!("v1-engine-{}-{}", timestamp, hex::encode(&random))
        }
        Version::V2c => {
            let random: [u8; 4] = rand::rng().random();
            format!("v2c-engine-{}-{}", timestamp, hex::encode(&random))
        }
    }
}
