use crate::dns::chain::{Chain, Handler};
use crate::dns::context::{Context, Proto};
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::DnsPacket;
use std::net::{IpAddr, Ipv6Addr};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 1000;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[repr(u8)]
enum RecordKind {
    Query = 1,
    Response = 2,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

fn encode_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

fn encode_addr(buf: &mut Vec<u8>, addr: IpAddr) {
    let mapped = match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    buf.extend_from_slice(&mapped.octets());
}

fn encode_bytes_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Builds one wire frame: 4-byte BE length prefix followed by the fixed
/// and length-prefixed fields described for dnstap records.
#[allow(clippy::too_many_arguments)]
fn encode_frame(
    kind: RecordKind,
    identity: &str,
    version: &str,
    addr: IpAddr,
    port: u16,
    protocol: &str,
    query_time_ns: u64,
    query_bytes: &[u8],
    response_time_ns: u64,
    response_bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(64 + query_bytes.len() + response_bytes.len());
    body.push(kind as u8);
    encode_string(&mut body, identity);
    encode_string(&mut body, version);
    encode_addr(&mut body, addr);
    body.extend_from_slice(&port.to_be_bytes());
    body.push(protocol.len() as u8);
    body.extend_from_slice(protocol.as_bytes());
    body.extend_from_slice(&query_time_ns.to_be_bytes());
    encode_bytes_field(&mut body, query_bytes);
    body.extend_from_slice(&response_time_ns.to_be_bytes());
    encode_bytes_field(&mut body, response_bytes);

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend(body);
    frame
}

fn estimate_bytes(msg: &DnsPacket) -> Vec<u8> {
    let size = 12
        + msg
            .questions
            .iter()
            .map(|q| q.name.len() + 5)
            .sum::<usize>()
        + msg
            .answers
            .iter()
            .chain(&msg.authorities)
            .chain(&msg.resources)
            .map(|r| r.domain().len() + 16)
            .sum::<usize>();
    vec![0u8; size]
}

fn proto_tag(proto: Proto) -> &'static str {
    match proto {
        Proto::Udp => "udp",
        Proto::Tcp => "tcp",
        Proto::Doh => "doh",
        Proto::Doq => "doq",
    }
}

/// Background connector that owns the Unix socket, retrying every 5
/// seconds on disconnect until the channel closes.
async fn run_writer(path: PathBuf, mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut stream: Option<UnixStream> = None;
    while let Some(frame) = rx.recv().await {
        loop {
            if stream.is_none() {
                match UnixStream::connect(&path).await {
                    Ok(s) => stream = Some(s),
                    Err(err) => {
                        tracing::warn!("dnstap connect to {path:?} failed: {err}");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                }
            }
            let conn = stream.as_mut().unwrap();
            match conn.write_all(&frame).await {
                Ok(()) => break,
                Err(err) => {
                    tracing::warn!("dnstap write failed, reconnecting: {err}");
                    stream = None;
                }
            }
        }
    }
}

/// Enqueues query/response records for a background writer connected to
/// a Unix socket. Full queue drops the newest record rather than
/// blocking the request path.
pub struct Dnstap {
    identity: String,
    version: String,
    sender: mpsc::Sender<Vec<u8>>,
}

impl Dnstap {
    pub fn spawn(socket_path: PathBuf, identity: String, version: String) -> Self {
        let (sender, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_writer(socket_path, rx));
        Self {
            identity,
            version,
            sender,
        }
    }

    fn enqueue(&self, frame: Vec<u8>) {
        if self.sender.try_send(frame).is_err() {
            tracing::warn!("dnstap queue full, dropping record");
        }
    }
}

#[async_trait::async_trait]
impl Handler for Dnstap {
    fn name(&self) -> &'static str {
        "dnstap"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        if ctx.internal() {
            chain.next(ctx, request, writer).await;
            return;
        }

        let query_time = now_ns();
        let query_bytes = estimate_bytes(request);
        let addr = ctx.remote_ip();
        let port = ctx.remote_addr.port();
        let protocol = proto_tag(ctx.proto);

        self.enqueue(encode_frame(
            RecordKind::Query,
            &self.identity,
            &self.version,
            addr,
            port,
            protocol,
            query_time,
            &query_bytes,
            0,
            &[],
        ));

        chain.next(ctx, request, writer).await;

        if let Some(msg) = writer.msg() {
            let response_bytes = estimate_bytes(msg);
            self.enqueue(encode_frame(
                RecordKind::Response,
                &self.identity,
                &self.version,
                addr,
                port,
                protocol,
                query_time,
                &query_bytes,
                now_ns(),
                &response_bytes,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_addr_maps_v4_into_16_bytes() {
        let mut buf = Vec::new();
        encode_addr(&mut buf, IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(buf.len(), 16);
        assert_eq!(
            IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(buf.as_slice()).unwrap())),
            IpAddr::V6(std::net::Ipv4Addr::new(127, 0, 0, 1).to_ipv6_mapped())
        );
    }

    #[test]
    fn frame_is_prefixed_with_body_length() {
        let frame = encode_frame(
            RecordKind::Query,
            "redoubt",
            "0.1.0",
            IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
            5353,
            "udp",
            1,
            b"abc",
            0,
            &[],
        );
        let declared = u32::from_be_bytes(frame[0..4].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - 4);
    }
}
