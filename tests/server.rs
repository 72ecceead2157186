//! End-to-end pipeline tests: UDP in, normalized trap records out.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use common::*;
use trapsink::config::{CommunityEngineConfig, EngineSetConfig, ServerConfig};
use trapsink::engine::ResponseManager;
use trapsink::lock::MemoryLocker;
use trapsink::message::{CommunityMessage, CommunityPdu};
use trapsink::pdu::PduType;
use trapsink::server::TrapServer;
use trapsink::trap::TrapMessage;
use trapsink::value::Value;
use trapsink::varbind::VarBind;
use trapsink::version::Version;
use trapsink::{Error, oid};

fn engine_config(v1: bool, v2c: bool) -> EngineSetConfig {
    let community = |enabled| CommunityEngineConfig {
        enabled,
        read_community: "public".into(),
        read_write_community: "private".into(),
    };
    EngineSetConfig {
        v1: Some(community(v1)),
        v2c: Some(community(v2c)),
        v3: None,
    }
}

fn test_config(workers: usize, ingress_size: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.receiver.port = 0;
    config.handler.worker_count = workers;
    config.handler.lock_timeout_seconds = 30;
    config.ingress_size = ingress_size;
    config
}

async fn start_server(
    engines: EngineSetConfig,
    workers: usize,
) -> (TrapServer<MemoryLocker>, mpsc::Receiver<TrapMessage>, SocketAddr, UdpSocket) {
    let server = TrapServer::new(
        test_config(workers, 64),
        Arc::new(MemoryLocker::new()),
        Arc::new(ResponseManager::new(&engines).unwrap()),
    )
    .unwrap();

    let egress = server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    (server, egress, addr, client)
}

async fn recv_trap(egress: &mut mpsc::Receiver<TrapMessage>) -> TrapMessage {
    tokio::time::timeout(Duration::from_secs(3), egress.recv())
        .await
        .expect("timed out waiting for trap message")
        .expect("egress queue closed")
}

#[tokio::test]
async fn v1_trap_end_to_end() {
    let (server, mut egress, addr, client) = start_server(engine_config(true, true), 2).await;

    let data = v1_trap(
        "public",
        oid!(1, 3, 6, 1, 4, 1, 9, 1, 1),
        6,
        1,
        12345,
        vec![VarBind::new(
            oid!(1, 3, 6, 1, 4, 1, 9, 9, 1),
            Value::OctetString(Bytes::from_static(b"hello")),
        )],
    );
    client.send_to(&data, addr).await.unwrap();

    let trap = recv_trap(&mut egress).await;
    assert_eq!(trap.version, Version::V1);
    assert_eq!(trap.pdu_type, PduType::TrapV1);
    assert_eq!(trap.community, "public");
    assert_eq!(trap.v1_enterprise_oid, "1.3.6.1.4.1.9.1.1");
    assert_eq!(trap.v1_generic_trap, 6);
    assert_eq!(trap.v1_specific_trap, 1);
    assert_eq!(trap.variable_map["1.3.6.1.2.1.1.3.0"], "12345");
    assert_eq!(trap.variable_map["1.3.6.1.4.1.9.9.1"], "hello");
    assert!(!trap.needs_response);
    assert_eq!(trap.raw_data, data);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_payload_is_suppressed_at_the_lock() {
    let engines = engine_config(false, true);
    let server = TrapServer::new(
        test_config(2, 64),
        Arc::new(MemoryLocker::new()),
        Arc::new(ResponseManager::new(&engines).unwrap()),
    )
    .unwrap();
    let mut egress = server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let data = v2c_trap(
        "public",
        12345,
        vec![VarBind::new(
            oid!(1, 3, 6, 1, 4, 1, 9, 9, 2),
            Value::OctetString(Bytes::from_static(b"hello v2c")),
        )],
    );

    // byte-identical payloads, back to back
    client.send_to(&data, addr).await.unwrap();
    client.send_to(&data, addr).await.unwrap();

    let trap = recv_trap(&mut egress).await;
    assert_eq!(trap.version, Version::V2c);
    assert_eq!(trap.v2c_v3_timestamp, 12345);
    assert_eq!(trap.variable_map["1.3.6.1.4.1.9.9.2"], "hello v2c");

    // the second arrival must not surface
    let second = tokio::time::timeout(Duration::from_millis(300), egress.recv()).await;
    assert!(second.is_err(), "duplicate trap reached egress");

    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.lock_acquired, 1);
    assert_eq!(snapshot.lock_busy, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn get_request_never_reaches_egress() {
    let (server, mut egress, addr, client) = start_server(engine_config(true, true), 2).await;

    let data = community_packet(
        Version::V1,
        "public",
        PduType::GetRequest,
        77,
        vec![VarBind::null(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0))],
    );
    client.send_to(&data, addr).await.unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(300), egress.recv()).await;
    assert!(nothing.is_err(), "rejected PDU reached egress");
    assert_eq!(server.metrics().snapshot().decode_failures, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn inform_is_acknowledged_and_flagged() {
    let (server, mut egress, addr, client) = start_server(engine_config(false, true), 2).await;

    let request_id = 0x7EADBEEF;
    let data = v2c_inform("public", request_id, 42, vec![]);
    client.send_to(&data, addr).await.unwrap();

    // acknowledgement comes back to the sending socket
    let mut buf = vec![0u8; 65_507];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("no Inform acknowledgement")
        .unwrap();
    let response = CommunityMessage::decode(Bytes::copy_from_slice(&buf[..len])).unwrap();
    match response.pdu {
        CommunityPdu::Pdu(pdu) => {
            assert_eq!(pdu.pdu_type, PduType::GetResponse);
            assert_eq!(pdu.request_id, request_id);
            assert!(pdu.varbinds.is_empty());
        }
        CommunityPdu::TrapV1(_) => panic!("expected GetResponse"),
    }

    let trap = recv_trap(&mut egress).await;
    assert!(trap.needs_response);
    assert_eq!(trap.request_id, request_id);
    assert_eq!(trap.pdu_type, PduType::InformRequest);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn disabled_version_is_dropped() {
    // only v2c enabled; v1 present but disabled
    let (server, mut egress, addr, client) = start_server(engine_config(false, true), 2).await;

    let data = v1_trap("public", oid!(1, 3, 6, 1, 4, 1, 9), 1, 0, 1, vec![]);
    client.send_to(&data, addr).await.unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(300), egress.recv()).await;
    assert!(nothing.is_err(), "disabled-version trap reached egress");
    assert_eq!(server.metrics().snapshot().decode_failures, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn distinct_payloads_flow_in_parallel() {
    let (server, mut egress, addr, client) = start_server(engine_config(false, true), 3).await;

    for i in 0..6u32 {
        let data = v2c_trap(
            "public",
            i,
            vec![VarBind::new(oid!(1, 3, 6, 1, 4, 1, 9, 9, 3), Value::Gauge32(i))],
        );
        client.send_to(&data, addr).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..6 {
        received.push(recv_trap(&mut egress).await);
    }
    assert_eq!(received.len(), 6);

    let mut uptimes: Vec<u32> = received.iter().map(|t| t.v2c_v3_timestamp).collect();
    uptimes.sort_unstable();
    assert_eq!(uptimes, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(server.metrics().snapshot().lock_acquired, 6);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_halts_ingestion() {
    let (server, mut egress, addr, client) = start_server(engine_config(false, true), 2).await;

    server.stop().await.unwrap();
    assert!(matches!(
        server.stop().await.unwrap_err(),
        Error::AlreadyStopped { .. }
    ));

    // datagrams sent after stop never surface
    let data = v2c_trap("public", 9, vec![]);
    client.send_to(&data, addr).await.unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(300), egress.recv()).await;
    // either the channel is closed or silent; no trap may appear
    match nothing {
        Ok(Some(_)) => panic!("trap processed after stop"),
        Ok(None) | Err(_) => {}
    }
}

#[tokio::test]
async fn restart_after_stop_works() {
    let engines = engine_config(false, true);
    let server = TrapServer::new(
        test_config(1, 8),
        Arc::new(MemoryLocker::new()),
        Arc::new(ResponseManager::new(&engines).unwrap()),
    )
    .unwrap();

    let egress = server.start().await.unwrap();
    server.stop().await.unwrap();
    drop(egress);

    let mut egress = server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&v2c_trap("public", 4, vec![]), addr)
        .await
        .unwrap();

    let trap = recv_trap(&mut egress).await;
    assert_eq!(trap.v2c_v3_timestamp, 4);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn lock_backend_failure_drops_packet() {
    use trapsink::server::{Metrics, TrapHandler};

    let engines = engine_config(false, true);
    let (ingress_tx, ingress_rx) = mpsc::channel(8);
    let (egress_tx, mut egress_rx) = mpsc::channel(8);
    let metrics = Arc::new(Metrics::new());

    let handler = Arc::new(TrapHandler::new(
        Arc::new(BrokenLocker),
        Arc::new(ResponseManager::new(&engines).unwrap()),
        Duration::from_secs(5),
        ingress_rx,
        egress_tx,
        Arc::clone(&metrics),
    ));
    handler.start(1).unwrap();

    let sockets = SocketPair::new().await;
    ingress_tx
        .send(sockets.packet(v2c_trap("public", 1, vec![])))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(300), egress_rx.recv()).await;
    assert!(nothing.is_err(), "trap surfaced despite lock failure");
    assert_eq!(metrics.snapshot().lock_errors, 1);

    handler.stop().await.unwrap();
}

#[tokio::test]
async fn second_arrival_skips_the_response_manager() {
    use trapsink::server::{Metrics, TrapHandler};

    let engines = engine_config(false, true);
    let (ingress_tx, ingress_rx) = mpsc::channel(8);
    let (egress_tx, mut egress_rx) = mpsc::channel(8);
    let locker = Arc::new(FirstWinsLocker::new());

    let handler = Arc::new(TrapHandler::new(
        Arc::clone(&locker),
        Arc::new(ResponseManager::new(&engines).unwrap()),
        Duration::from_secs(5),
        ingress_rx,
        egress_tx,
        Arc::new(Metrics::new()),
    ));
    handler.start(1).unwrap();

    let sockets = SocketPair::new().await;
    let data = v2c_trap("public", 2, vec![]);
    ingress_tx.send(sockets.packet(data.clone())).await.unwrap();
    ingress_tx.send(sockets.packet(data)).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), egress_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.v2c_v3_timestamp, 2);

    let second = tokio::time::timeout(Duration::from_millis(300), egress_rx.recv()).await;
    assert!(second.is_err(), "duplicate surfaced");
    assert_eq!(locker.acquires.load(std::sync::atomic::Ordering::SeqCst), 2);

    handler.stop().await.unwrap();
}

#[tokio::test]
async fn burst_against_one_slot_queue_sheds_load() {
    use trapsink::server::{Metrics, UdpReceiver};

    // 1-slot ingress queue with no consumer attached
    let (ingress_tx, mut ingress_rx) = mpsc::channel(1);
    let metrics = Arc::new(Metrics::new());
    let receiver = UdpReceiver::new(ingress_tx, Arc::clone(&metrics));
    receiver.start(0).unwrap();
    let addr = receiver.local_addr().unwrap();
    let target = SocketAddr::new("127.0.0.1".parse().unwrap(), addr.port());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..5u32 {
        let data = v2c_trap("public", i, vec![]);
        client.send_to(&data, target).await.unwrap();
    }

    // let the receiver drain the socket
    tokio::time::sleep(Duration::from_millis(300)).await;

    // exactly one slot filled; the remainder counted as drops
    assert!(ingress_rx.try_recv().is_ok());
    assert!(ingress_rx.try_recv().is_err());
    assert_eq!(metrics.snapshot().ingress_dropped, 4);

    receiver.stop().await.unwrap();
}
