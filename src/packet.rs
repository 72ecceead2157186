//! Inbound datagram representation.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// An inbound datagram as received by the UDP receiver.
///
/// The payload is an owned copy of the receive buffer (enqueued packets
/// never alias each other), the remote endpoint identifies the sender, and
/// the socket handle is sufficient to address a reply to that endpoint.
/// The reply address never changes after construction.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Datagram payload.
    pub data: Bytes,
    /// Remote endpoint the datagram arrived from.
    pub source: SocketAddr,
    /// The receiving socket, used to send responses back to `source`.
    socket: Arc<UdpSocket>,
}

impl RawPacket {
    /// Create a new raw packet.
    pub fn new(data: Bytes, source: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Self { data, source, socket }
    }

    /// Send a reply datagram to this packet's source endpoint.
    pub async fn reply(&self, data: &[u8]) -> Result<()> {
        self.socket
            .send_to(data, self.source)
            .await
            .map_err(|e| Error::Network { target: self.source, source: e })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_reaches_source() {
        let receiver = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender_addr = sender.local_addr().unwrap();

        let packet = RawPacket::new(Bytes::from_static(b"trap"), sender_addr, receiver);
        packet.reply(b"ack").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = sender.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ack");
        assert_eq!(from, packet.socket.local_addr().unwrap());
    }
}
