//! Error types for trapsink.
//!
//! Per-packet failures are flat sentinels: every decode/authentication
//! outcome the engines can produce maps to exactly one variant, so callers
//! (and tests) match on the kind without unwrapping nested sources. All
//! per-packet errors are terminal for that packet and non-fatal for the
//! process; lifecycle errors are returned to the caller.

use std::net::SocketAddr;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all trapsink operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Request packet carried no data.
    #[error("request is nil")]
    NilRequest,

    /// No engine is registered for the packet's SNMP version.
    #[error("unsupported SNMP version")]
    UnsupportedVersion,

    /// The outer sequence / version integer could not be parsed.
    #[error("unable to parse SNMP version")]
    ParseVersion,

    /// The version integer is not one of {0, 1, 3}.
    #[error("illegal SNMP version {0}")]
    IllegalVersion(i32),

    /// An engine exists for the version but is disabled by configuration.
    #[error("SNMP version is disabled")]
    DisabledVersion,

    /// PDU type is not valid for the message's SNMP version.
    #[error("version mismatch")]
    VersionMismatch,

    /// v1/v2c message carried an empty community string.
    #[error("community is empty")]
    EmptyCommunity,

    /// Community matches neither configured value.
    #[error("invalid community")]
    InvalidCommunity,

    /// PDU type is rejected by the trap-ingestion policy.
    #[error("unsupported PDU type")]
    UnsupportedPduType,

    /// Full decode of the datagram failed (including USM auth/decrypt).
    #[error("unable to decode SNMP request")]
    DecodeRequest,

    /// SNMPv1 has no Inform operation.
    #[error("SNMPv1 does not support Inform requests")]
    V1InformNotSupported,

    /// SNMPv1 Traps are fire-and-forget; there is nothing to respond to.
    #[error("SNMPv1 Trap does not require a response")]
    V1TrapNoResponse,

    /// Response construction was asked for a non-Inform PDU.
    #[error("not an Inform request")]
    InvalidInformRequest,

    /// BER-level structural failure with the byte offset of the violation.
    #[error("malformed packet at offset {offset}")]
    Malformed { offset: usize },

    /// Lifecycle: component was started twice.
    #[error("{component} already started")]
    AlreadyStarted { component: &'static str },

    /// Lifecycle: component was stopped twice (or never started).
    #[error("{component} already stopped")]
    AlreadyStopped { component: &'static str },

    /// Lock backend transport failure.
    #[error("lock backend error: {0}")]
    LockBackend(Box<str>),

    /// Socket-level failure (bind, send).
    #[error("network error communicating with {target}: {source}")]
    Network {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration (construction-time fatal).
    #[error("configuration error: {0}")]
    Config(Box<str>),
}

impl Error {
    /// Construct a BER decode error at the given offset.
    pub(crate) fn malformed(offset: usize) -> Self {
        Error::Malformed { offset }
    }

    /// Construct a configuration error.
    pub(crate) fn config(msg: impl Into<Box<str>>) -> Self {
        Error::Config(msg.into())
    }
}
