use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::DnsPacket;
use std::net::IpAddr;

/// One CIDR entry: the network address plus its prefix length.
#[derive(Clone, Copy, Debug)]
struct Cidr {
    network: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    fn parse(value: &str) -> Option<Self> {
        let (addr, len) = value.split_once('/')?;
        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = len.parse().ok()?;
        Some(Self { network, prefix_len })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(candidate)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len.min(32))
                };
                (u32::from(net) & mask) == (u32::from(candidate) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(candidate)) => {
                let mask: u128 = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len.min(128))
                };
                (u128::from(net) & mask) == (u128::from(candidate) & mask)
            }
            _ => false,
        }
    }
}

/// Admits or silently drops queries by client IP. A trie would scale
/// better for thousands of entries but a linear scan over a handful of
/// configured CIDRs (the common case for an access list) is simpler and
/// just as correct.
pub struct AccessList {
    allowed: Vec<Cidr>,
}

impl AccessList {
    pub fn new(cidrs: &[String]) -> Self {
        Self {
            allowed: cidrs.iter().filter_map(|c| Cidr::parse(c)).collect(),
        }
    }

    fn admits(&self, ip: IpAddr) -> bool {
        self.allowed.iter().any(|cidr| cidr.contains(ip))
    }
}

#[async_trait::async_trait]
impl Handler for AccessList {
    fn name(&self) -> &'static str {
        "accesslist"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        if ctx.internal() || self.admits(ctx.remote_ip()) {
            chain.next(ctx, request, writer).await;
        } else {
            tracing::debug!(ip = %ctx.remote_ip(), "denied by access list");
            chain.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_address_within_cidr() {
        let list = AccessList::new(&["10.0.0.0/8".to_string()]);
        assert!(list.admits("10.1.2.3".parse().unwrap()));
        assert!(!list.admits("192.168.0.1".parse().unwrap()));
    }

    #[test]
    fn open_list_admits_everything() {
        let list = AccessList::new(&["0.0.0.0/0".to_string(), "::/0".to_string()]);
        assert!(list.admits("8.8.8.8".parse().unwrap()));
        assert!(list.admits("2001:db8::1".parse().unwrap()));
    }
}
