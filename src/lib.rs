//! # trapsink
//!
//! Trap ingestion and dedup-dispatch core for hardware-monitoring fleets.
//!
//! The core receives raw SNMP trap datagrams, authenticates them against a
//! configured security policy, deduplicates concurrent arrivals of the
//! same payload across a horizontally-scaled fleet via a distributed lock,
//! decodes them into a normalized alert record and hands that record to a
//! downstream processing stage.
//!
//! ## Pipeline
//!
//! ```text
//! UDP socket -> ingress queue -> worker pool -> {dedup lock, engines,
//! normalizer} -> egress queue -> downstream
//! ```
//!
//! Both queues are bounded. The receiver never blocks on downstream
//! slowness (full ingress drops at the edge) and workers never stall on a
//! slow consumer (timed egress send).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trapsink::config::{CommunityEngineConfig, EngineSetConfig, ServerConfig};
//! use trapsink::engine::ResponseManager;
//! use trapsink::lock::MemoryLocker;
//! use trapsink::server::TrapServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trapsink::Error> {
//!     let engines = EngineSetConfig {
//!         v2c: Some(CommunityEngineConfig {
//!             enabled: true,
//!             read_community: "public".into(),
//!             read_write_community: "private".into(),
//!         }),
//!         ..Default::default()
//!     };
//!
//!     let server = TrapServer::new(
//!         ServerConfig::default(),
//!         Arc::new(MemoryLocker::new()),
//!         Arc::new(ResponseManager::new(&engines)?),
//!     )?;
//!
//!     let mut egress = server.start().await?;
//!     while let Some(trap) = egress.recv().await {
//!         println!("{} {} vars", trap.source_ip, trap.variable_map.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Deduplication
//!
//! Every datagram is fingerprinted (SHA-256 over the raw bytes) and a
//! set-if-absent lock with TTL is taken against the shared backend before
//! processing. Exactly one process in the fleet wins a given payload; the
//! TTL bounds the dedup window and doubles as a negative cache after
//! failures. See [`lock::DistributedLocker`] for the backend contract.

pub mod ber;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod message;
pub mod oid;
pub mod packet;
pub mod pdu;
pub mod server;
pub mod trap;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

// Re-exports for convenience
pub use config::ServerConfig;
pub use engine::{DecodedPacket, Engine, EngineSet, ResponseManager};
pub use error::{Error, Result};
pub use lock::{DistributedLocker, MemoryLocker, fingerprint_key};
pub use oid::Oid;
pub use packet::RawPacket;
pub use pdu::{Pdu, PduType, TrapV1Pdu};
pub use server::{Metrics, MetricsSnapshot, TrapServer};
pub use trap::TrapMessage;
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;

/// Testing utilities exposed via the `testing` feature.
#[cfg(feature = "testing")]
pub mod testing {
    pub use crate::util::hex::{decode as decode_hex, encode as encode_hex};
}
