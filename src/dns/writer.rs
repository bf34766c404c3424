use crate::dns::context::Proto;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;
use std::net::IpAddr;

/// Decorates a transport-level reply sink with the bookkeeping every
/// policy middleware needs: whether a reply was written yet, what it
/// contained, and who it's going to. Mirrors the way the transport
/// layer's `Message` carries a raw buffer, but a level up: handlers
/// here work with a parsed `DnsPacket`, not wire bytes.
pub trait ResponseWriter: Send {
    fn remote_ip(&self) -> IpAddr;
    fn proto(&self) -> Proto;
    fn internal(&self) -> bool;

    fn written(&self) -> bool;
    fn msg(&self) -> Option<&DnsPacket>;
    fn rcode(&self) -> Option<ResponseCode>;

    /// Records `msg` as the final answer. Implementations must error on a
    /// second call; `written()` becomes true after the first.
    fn write_msg(&mut self, msg: DnsPacket) -> Result<(), WriteError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteError;

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("response already written")
    }
}

impl std::error::Error for WriteError {}

/// The base writer every chain starts from: a plain in-memory slot, no
/// decoration. Transport listeners build one of these per request and
/// serialize `msg()` back onto the wire once the chain returns.
pub struct BaseWriter {
    remote_ip: IpAddr,
    proto: Proto,
    internal: bool,
    msg: Option<DnsPacket>,
}

impl BaseWriter {
    pub fn new(remote_ip: IpAddr, proto: Proto, internal: bool) -> Self {
        Self {
            remote_ip,
            proto,
            internal,
            msg: None,
        }
    }
}

impl ResponseWriter for BaseWriter {
    fn remote_ip(&self) -> IpAddr {
        self.remote_ip
    }

    fn proto(&self) -> Proto {
        self.proto
    }

    fn internal(&self) -> bool {
        self.internal
    }

    fn written(&self) -> bool {
        self.msg.is_some()
    }

    fn msg(&self) -> Option<&DnsPacket> {
        self.msg.as_ref()
    }

    fn rcode(&self) -> Option<ResponseCode> {
        self.msg.as_ref().map(|m| m.header.response_code)
    }

    fn write_msg(&mut self, msg: DnsPacket) -> Result<(), WriteError> {
        if self.msg.is_some() {
            return Err(WriteError);
        }
        self.msg = Some(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redoubt_proto::packet::header::Header;

    #[test]
    fn write_msg_is_exactly_once() {
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);
        assert!(!writer.written());
        writer.write_msg(DnsPacket::new(Header::response(1))).unwrap();
        assert!(writer.written());
        let err = writer
            .write_msg(DnsPacket::new(Header::response(1)))
            .unwrap_err();
        assert_eq!(err, WriteError);
    }
}
