use redoubt_proto::packet::QueryType;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Transport a query arrived on. Drives which policy middlewares apply
/// (reflex and the rate limiter only ever see `Udp`) and is echoed in the
/// access log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proto {
    Udp,
    Tcp,
    Doh,
    Doq,
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Doh => "doh",
            Self::Doq => "doq",
        };
        f.write_str(name)
    }
}

/// Sentinel address a middleware uses to re-dispatch a synthetic query
/// through the chain without tripping policy middlewares meant for real
/// clients.
pub const INTERNAL_ADDR: SocketAddr = SocketAddr::new(
    IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 255)),
    0,
);

/// Per-request state threaded through every handler. Not shared across
/// requests: each inbound query gets its own `Context`.
#[derive(Debug)]
pub struct Context {
    pub remote_addr: SocketAddr,
    pub proto: Proto,
    pub started_at: Instant,
    pub deadline: Option<Instant>,
    loop_counts: HashMap<(String, QueryType), u8>,
}

impl Context {
    pub fn new(remote_addr: SocketAddr, proto: Proto) -> Self {
        Self {
            remote_addr,
            proto,
            started_at: Instant::now(),
            deadline: None,
            loop_counts: HashMap::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn internal(&self) -> bool {
        self.remote_addr == INTERNAL_ADDR
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote_addr.ip()
    }

    /// Increments and returns the visit count for `(name, qtype)` within
    /// this request's context tree. Used by the loop detector; never
    /// shared with other requests.
    pub fn bump_loop_count(&mut self, name: &str, qtype: QueryType) -> u8 {
        let key = (name.to_string(), qtype);
        let entry = self.loop_counts.entry(key).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_detects_sentinel_address() {
        let ctx = Context::new(INTERNAL_ADDR, Proto::Udp);
        assert!(ctx.internal());

        let ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        assert!(!ctx.internal());
    }

    #[test]
    fn loop_count_increments_per_question() {
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        assert_eq!(ctx.bump_loop_count("a.com", QueryType::A), 1);
        assert_eq!(ctx.bump_loop_count("a.com", QueryType::A), 2);
        assert_eq!(ctx.bump_loop_count("b.com", QueryType::A), 1);
    }
}
