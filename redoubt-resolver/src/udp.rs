use crate::prelude::{Resolver, ResolverError};
use redoubt_proto::buffer::BytePacketBuffer;
use redoubt_proto::packet::question::Question;
use redoubt_proto::packet::{DnsPacket, QueryType};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Resolves against a single upstream server over plain UDP. Used by the
/// forwarder as one leg of its sequential-failover list; a `tcp-tls` or
/// `tcp` upstream would need a different resolver behind the same trait.
#[derive(Debug)]
pub struct UdpResolver {
    identifier: String,
    upstream: SocketAddr,
    bind_address: SocketAddr,
    timeout: Duration,
    next_id: AtomicU16,
}

impl UdpResolver {
    pub fn new(identifier: impl Into<String>, upstream: SocketAddr, bind_address: SocketAddr) -> Self {
        Self {
            identifier: identifier.into(),
            upstream,
            bind_address,
            timeout: Duration::from_secs(2),
            next_id: AtomicU16::new(0),
        }
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }
}

#[async_trait::async_trait]
impl Resolver for UdpResolver {
    fn kind(&self) -> &'static str {
        "udp"
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    #[tracing::instrument(skip(self))]
    async fn resolve(&self, kind: QueryType, hostname: &str) -> Result<DnsPacket, ResolverError> {
        let socket = UdpSocket::bind(self.bind_address)
            .await
            .map_err(|e| ResolverError::Io(e.to_string()))?;

        let mut packet = DnsPacket::default();
        packet.header.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        packet.header.recursion_desired = true;
        packet
            .questions
            .push(Question::new(hostname.to_string(), kind));

        let req_buffer = packet
            .create_buffer()
            .map_err(|e| ResolverError::InvalidResponse(e.to_string()))?;

        socket
            .send_to(&req_buffer.buf[0..req_buffer.pos()], self.upstream)
            .await
            .map_err(|e| ResolverError::Io(e.to_string()))?;

        let mut res_buffer = BytePacketBuffer::default();
        let recv = timeout(self.timeout, socket.recv_from(&mut res_buffer.buf))
            .await
            .map_err(|_| ResolverError::Timeout)?
            .map_err(|e| ResolverError::Io(e.to_string()))?;

        tracing::debug!("received {} bytes from {}", recv.0, self.upstream);

        DnsPacket::try_from(res_buffer).map_err(|e| ResolverError::InvalidResponse(e.to_string()))
    }
}
