use crate::dns::chain::{Chain, Handler};
use crate::dns::context::{Context, Proto};
use crate::dns::cookie::CookieSecret;
use crate::dns::writer::ResponseWriter;
use dashmap::DashMap;
use parking_lot::Mutex;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::record::Opt;
use redoubt_proto::packet::DnsPacket;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 25_600;
const SWEEP_IDLE: Duration = Duration::from_secs(600);

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_minute: u32) -> Self {
        let capacity = rate_per_minute.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn admit(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Entry {
    bucket: Mutex<TokenBucket>,
    cookie: Mutex<Option<[u8; 16]>>,
    last_seen: Mutex<Instant>,
}

fn ip_key(ip: IpAddr) -> u64 {
    let mut hasher = DefaultHasher::new();
    match ip {
        IpAddr::V4(v4) => v4.octets().hash(&mut hasher),
        IpAddr::V6(v6) => v6.octets().hash(&mut hasher),
    }
    hasher.finish()
}

/// Per-client token bucket with RFC 7873 DNS cookie soft verification.
/// UDP clients without a valid cookie spend a token per query; once a
/// server cookie has been handed out and echoed back correctly, further
/// queries bypass the bucket entirely.
pub struct RateLimiter {
    rate_per_minute: u32,
    secret: CookieSecret,
    store: DashMap<u64, Entry>,
}

impl RateLimiter {
    pub fn new(rate_per_minute: u32, secret: CookieSecret) -> Self {
        Self {
            rate_per_minute,
            secret,
            store: DashMap::new(),
        }
    }

    fn evict_if_full(&self) {
        if self.store.len() < MAX_ENTRIES {
            return;
        }
        if let Some(oldest_key) = self
            .store
            .iter()
            .min_by_key(|e| *e.value().last_seen.lock())
            .map(|e| *e.key())
        {
            self.store.remove(&oldest_key);
        }
    }

    /// Drops entries idle for at least ten minutes. Intended to run on a
    /// five-minute `tokio::time::interval`.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.store
            .retain(|_, entry| now.duration_since(*entry.last_seen.lock()) < SWEEP_IDLE);
    }

    /// Spawns a background task that calls `sweep` every five minutes for
    /// the lifetime of the process.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                self.sweep();
            }
        });
    }

    fn entry_for(&self, ip: IpAddr) -> dashmap::mapref::one::Ref<'_, u64, Entry> {
        let key = ip_key(ip);
        if self.store.get(&key).is_none() {
            self.evict_if_full();
            self.store
                .entry(key)
                .or_insert_with(|| Entry {
                    bucket: Mutex::new(TokenBucket::new(self.rate_per_minute)),
                    cookie: Mutex::new(None),
                    last_seen: Mutex::new(Instant::now()),
                });
        }
        self.store.get(&key).expect("entry inserted above")
    }
}

fn client_cookie(opt: &Opt) -> Option<[u8; 8]> {
    opt.cookie().map(|(client, _server)| *client)
}

#[async_trait::async_trait]
impl Handler for RateLimiter {
    fn name(&self) -> &'static str {
        "ratelimit"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        if ctx.internal() || self.rate_per_minute == 0 || ctx.remote_ip().is_loopback() {
            chain.next(ctx, request, writer).await;
            return;
        }

        let ip = ctx.remote_ip();
        let entry = self.entry_for(ip);
        *entry.last_seen.lock() = Instant::now();

        let opt_cookie = request.edns_opt().and_then(client_cookie);

        if let Some(client) = opt_cookie {
            let expected = self.secret.server_cookie(ip, client);
            let mut full = [0u8; 16];
            full[0..8].copy_from_slice(&client);
            full[8..16].copy_from_slice(&expected);

            let cached = *entry.cookie.lock();
            if cached.is_none() || cached == Some(full) {
                *entry.cookie.lock() = Some(full);
                drop(entry);
                chain.next(ctx, request, writer).await;
                return;
            }

            if ctx.proto == Proto::Udp {
                if !entry.bucket.lock().admit() {
                    drop(entry);
                    chain.cancel();
                    return;
                }
                *entry.cookie.lock() = Some(full);
                let mut opt = request
                    .edns_opt()
                    .cloned()
                    .unwrap_or_else(|| Opt::new(1232, false));
                opt.set_cookie(client, Some(expected));
                request.set_edns_opt(opt);
                drop(entry);
                chain.cancel_with_rcode(request, writer, ResponseCode::BadCookie, request.dnssec_ok());
                return;
            }
        }

        if !entry.bucket.lock().admit() {
            drop(entry);
            chain.cancel();
            return;
        }
        drop(entry);
        chain.next(ctx, request, writer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::registry::Registry;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::Header;

    struct Delegates;

    #[async_trait::async_trait]
    impl Handler for Delegates {
        fn name(&self) -> &'static str {
            "delegates"
        }

        async fn serve_dns(
            &self,
            _ctx: &mut Context,
            request: &mut DnsPacket,
            writer: &mut dyn ResponseWriter,
            chain: &mut Chain,
        ) {
            chain.cancel_with_rcode(request, writer, ResponseCode::NoError, false);
        }
    }

    fn make_chain(rate: u32) -> Chain {
        let mut registry = Registry::new();
        registry.append(Box::new(RateLimiter::new(rate, CookieSecret::generate())));
        registry.append(Box::new(Delegates));
        Chain::new(registry.build())
    }

    #[tokio::test]
    async fn burst_without_cookie_produces_a_drop() {
        let mut chain = make_chain(1);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        let mut drops = 0;
        for _ in 0..10 {
            chain.reset();
            let mut ctx = Context::new((ip, 5000).into(), Proto::Udp);
            let mut request = DnsPacket::new(Header::question(1));
            let mut writer = BaseWriter::new(ip, Proto::Udp, false);
            chain.next(&mut ctx, &mut request, &mut writer).await;
            if !writer.written() {
                drops += 1;
            }
        }
        assert!(drops >= 1);
    }

    #[tokio::test]
    async fn zero_rate_disables_limiting() {
        let mut chain = make_chain(0);
        let ip: IpAddr = "203.0.113.10".parse().unwrap();

        for _ in 0..50 {
            chain.reset();
            let mut ctx = Context::new((ip, 5000).into(), Proto::Udp);
            let mut request = DnsPacket::new(Header::question(1));
            let mut writer = BaseWriter::new(ip, Proto::Udp, false);
            chain.next(&mut ctx, &mut request, &mut writer).await;
            assert!(writer.written());
        }
    }

    #[tokio::test]
    async fn loopback_bypasses_limiting() {
        let mut chain = make_chain(1);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..20 {
            chain.reset();
            let mut ctx = Context::new((ip, 5000).into(), Proto::Udp);
            let mut request = DnsPacket::new(Header::question(1));
            let mut writer = BaseWriter::new(ip, Proto::Udp, false);
            chain.next(&mut ctx, &mut request, &mut writer).await;
            assert!(writer.written());
        }
    }
}
