//! Shared helpers for integration tests: datagram builders and scripted
//! lock backends.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use trapsink::error::Result;
use trapsink::lock::DistributedLocker;
use trapsink::message::{
    CommunityMessage, CommunityPdu, MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message,
};
use trapsink::oid::Oid;
use trapsink::packet::RawPacket;
use trapsink::pdu::{Pdu, PduType, TrapV1Pdu};
use trapsink::v3::auth::authenticate_message;
use trapsink::v3::{AuthProtocol, LocalizedKey, UsmSecurityParams};
use trapsink::value::Value;
use trapsink::varbind::VarBind;
use trapsink::version::Version;
use trapsink::oid;

/// sysUpTime.0
pub fn sys_uptime_oid() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
}

/// snmpTrapOID.0
pub fn snmp_trap_oid() -> Oid {
    oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0)
}

/// Build an SNMPv1 Trap datagram.
pub fn v1_trap(
    community: &str,
    enterprise: Oid,
    generic: i32,
    specific: i32,
    uptime: u32,
    varbinds: Vec<VarBind>,
) -> Bytes {
    let message = CommunityMessage {
        version: Version::V1,
        community: Bytes::copy_from_slice(community.as_bytes()),
        pdu: CommunityPdu::TrapV1(TrapV1Pdu {
            enterprise,
            agent_addr: [192, 168, 1, 10],
            generic_trap: generic,
            specific_trap: specific,
            time_stamp: uptime,
            varbinds,
        }),
    };
    message.encode()
}

/// Build a v1/v2c datagram around a generic PDU.
pub fn community_packet(
    version: Version,
    community: &str,
    pdu_type: PduType,
    request_id: i32,
    varbinds: Vec<VarBind>,
) -> Bytes {
    let message = CommunityMessage {
        version,
        community: Bytes::copy_from_slice(community.as_bytes()),
        pdu: CommunityPdu::Pdu(Pdu::new(pdu_type, request_id, varbinds)),
    };
    message.encode()
}

/// Build an SNMPv2c-Trap datagram with sysUpTime leading the varbinds.
pub fn v2c_trap(community: &str, uptime: u32, varbinds: Vec<VarBind>) -> Bytes {
    let mut all = vec![
        VarBind::new(sys_uptime_oid(), Value::TimeTicks(uptime)),
        VarBind::new(
            snmp_trap_oid(),
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1)),
        ),
    ];
    all.extend(varbinds);
    community_packet(Version::V2c, community, PduType::TrapV2, 1, all)
}

/// Build an SNMPv2c InformRequest datagram.
pub fn v2c_inform(community: &str, request_id: i32, uptime: u32, varbinds: Vec<VarBind>) -> Bytes {
    let mut all = vec![VarBind::new(sys_uptime_oid(), Value::TimeTicks(uptime))];
    all.extend(varbinds);
    community_packet(Version::V2c, community, PduType::InformRequest, request_id, all)
}

/// Build an SNMPv3 notification datagram.
///
/// `auth` carries the protocol and passphrase used to sign the message
/// when `level` requires authentication.
pub fn v3_notification(
    level: SecurityLevel,
    user: &str,
    engine_id: &[u8],
    pdu_type: PduType,
    request_id: i32,
    varbinds: Vec<VarBind>,
    auth: Option<(AuthProtocol, &[u8])>,
) -> Bytes {
    let pdu = Pdu::new(pdu_type, request_id, varbinds);
    let scoped = ScopedPdu::new(Bytes::copy_from_slice(engine_id), Bytes::new(), pdu);
    let global = MsgGlobalData::new(request_id, 65_507, MsgFlags::new(level, false));

    let mut usm = UsmSecurityParams::new(
        Bytes::copy_from_slice(engine_id),
        1,
        100,
        Bytes::copy_from_slice(user.as_bytes()),
    );

    match (level.requires_auth(), auth) {
        (true, Some((protocol, passphrase))) => {
            usm = usm.with_auth_placeholder(protocol.mac_len());
            let message = V3Message::new(global, usm.encode(), scoped);
            let mut bytes = message.encode().to_vec();

            let (offset, len) = UsmSecurityParams::find_auth_params_offset(&bytes)
                .expect("auth params present in built message");
            let key = LocalizedKey::from_password(protocol, passphrase, engine_id);
            authenticate_message(&key, &mut bytes, offset, len);
            Bytes::from(bytes)
        }
        _ => V3Message::new(global, usm.encode(), scoped).encode(),
    }
}

/// A pair of sockets: one playing the receiver, one playing the agent.
pub struct SocketPair {
    pub receiver: Arc<UdpSocket>,
    pub agent: UdpSocket,
    pub agent_addr: SocketAddr,
}

impl SocketPair {
    pub async fn new() -> Self {
        let receiver = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let agent_addr = agent.local_addr().unwrap();
        Self { receiver, agent, agent_addr }
    }

    /// Wrap bytes as a packet that arrived from the agent.
    pub fn packet(&self, data: Bytes) -> RawPacket {
        RawPacket::new(data, self.agent_addr, Arc::clone(&self.receiver))
    }

    /// Receive one datagram on the agent side with a deadline.
    pub async fn agent_recv(&self) -> Bytes {
        let mut buf = vec![0u8; 65_507];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), self.agent.recv_from(&mut buf))
            .await
            .expect("timed out waiting for response datagram")
            .unwrap();
        Bytes::copy_from_slice(&buf[..len])
    }
}

/// Lock backend that grants the first acquire of each key and rejects the
/// rest, while counting calls.
#[derive(Debug, Default)]
pub struct FirstWinsLocker {
    inner: trapsink::MemoryLocker,
    pub acquires: AtomicU64,
}

impl FirstWinsLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributedLocker for FirstWinsLocker {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire(key, ttl).await
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.inner.release(key).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// Lock backend whose every acquire fails with a transport error.
#[derive(Debug, Default)]
pub struct BrokenLocker;

impl DistributedLocker for BrokenLocker {
    async fn acquire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Err(trapsink::Error::LockBackend("backend down".into()))
    }

    async fn release(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
