//! SNMP protocol version.

/// SNMP protocol version.
///
/// The wire encoding uses 0 for v1, 1 for v2c and 3 for v3; value 2 was
/// assigned to the never-deployed SNMPv2p and is treated as illegal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Version {
    /// SNMPv1 (RFC 1157)
    V1,
    /// SNMPv2c (RFC 1901)
    V2c,
    /// SNMPv3 (RFC 3412)
    V3,
}

impl Version {
    /// Create from the wire integer.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// Get the wire integer.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
            Self::V3 => 3,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2c => write!(f, "v2c"),
            Self::V3 => write!(f, "v3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        for v in [Version::V1, Version::V2c, Version::V3] {
            assert_eq!(Version::from_i32(v.as_i32()), Some(v));
        }
    }

    #[test]
    fn test_reserved_and_unknown_rejected() {
        assert_eq!(Version::from_i32(2), None);
        assert_eq!(Version::from_i32(4), None);
        assert_eq!(Version::from_i32(-1), None);
    }
}
