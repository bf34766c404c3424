use crate::dns::chain::{Chain, Handler};
use crate::dns::context::{Context, Proto};
use crate::dns::writer::ResponseWriter;
use dashmap::DashMap;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::{DnsPacket, QueryType};
use std::net::IpAddr;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 100_000;
const SWEEP_IDLE: Duration = Duration::from_secs(600);

fn amp_factor(qtype: QueryType) -> f64 {
    match qtype {
        QueryType::DNSKEY => 20.0,
        QueryType::RRSIG => 15.0,
        QueryType::TXT => 10.0,
        QueryType::NS | QueryType::DS => 5.0,
        QueryType::MX => 4.0,
        QueryType::SOA => 3.0,
        _ => 1.0,
    }
}

fn type_bit(qtype: QueryType) -> u16 {
    match qtype {
        QueryType::A => 1 << 0,
        QueryType::AAAA => 1 << 1,
        QueryType::NS => 1 << 2,
        QueryType::CNAME => 1 << 3,
        QueryType::SOA => 1 << 4,
        QueryType::PTR => 1 << 5,
        QueryType::MX => 1 << 6,
        QueryType::TXT => 1 << 7,
        QueryType::DS => 1 << 8,
        QueryType::OPT => 1 << 9,
        QueryType::RRSIG => 1 << 10,
        QueryType::DNSKEY => 1 << 11,
        QueryType::Unknown(_) => 1 << 12,
    }
}

#[derive(Debug, Clone)]
struct Profile {
    first_seen: Instant,
    last_seen: Instant,
    total_queries: u64,
    high_amp_queries: u64,
    total_amp_factor: f64,
    total_request_bytes: u64,
    total_response_bytes: u64,
    has_tcp: bool,
    has_normal_q: bool,
    query_types_bitmap: u16,
}

impl Profile {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            first_seen: now,
            last_seen: now,
            total_queries: 0,
            high_amp_queries: 0,
            total_amp_factor: 0.0,
            total_request_bytes: 0,
            total_response_bytes: 0,
            has_tcp: false,
            has_normal_q: false,
            query_types_bitmap: 0,
        }
    }

    /// Reproduces the scoring formula verbatim: band-based contributions
    /// clamped to [0,1]. `has_tcp` always yields zero since TCP cannot be
    /// source-spoofed, and it's a strong signal the client is real.
    fn score(&self) -> f64 {
        if self.has_tcp {
            return 0.0;
        }
        if self.total_queries < 10 {
            return 0.0;
        }

        let duration = self
            .last_seen
            .saturating_duration_since(self.first_seen)
            .as_secs_f64()
            .max(1.0);
        let qps = self.total_queries as f64 / duration;
        let high_amp_ratio = self.high_amp_queries as f64 / self.total_queries as f64;
        let byte_ratio = if self.total_request_bytes == 0 {
            0.0
        } else {
            self.total_response_bytes as f64 / self.total_request_bytes as f64
        };

        let mut score: f64 = 0.0;

        if qps > 30.0 {
            score += 0.35;
        } else if qps > 15.0 {
            score += 0.20;
        } else if qps > 5.0 {
            score += 0.10;
        }

        if high_amp_ratio > 0.8 && qps > 10.0 {
            score += 0.25;
        } else if high_amp_ratio > 0.5 && qps > 15.0 {
            score += 0.15;
        }

        if !self.has_normal_q && self.total_queries > 30 && qps > 5.0 {
            score += 0.15;
        }

        if byte_ratio > 10.0 && self.total_response_bytes > 50_000 {
            score += 0.15;
        } else if byte_ratio > 5.0 && self.total_response_bytes > 100_000 {
            score += 0.10;
        }

        if self.query_types_bitmap.count_ones() == 1 && self.total_queries > 50 {
            score += 0.10;
        }

        let diversity = self.query_types_bitmap.count_ones();
        if diversity >= 4 {
            score -= 0.15;
        } else if diversity >= 2 {
            score -= 0.05;
        }
        if self.has_normal_q {
            score -= 0.10;
        }
        if duration > 60.0 && qps < 5.0 {
            score -= 0.10;
        }

        score.clamp(0.0, 1.0)
    }
}

fn is_normal_qtype(qtype: QueryType) -> bool {
    matches!(qtype, QueryType::A | QueryType::AAAA)
}

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Learning,
    Block,
    Monitor,
}

/// Scores UDP clients for amplification-attack-shaped behavior and
/// optionally refuses them. A single TCP query from the same IP clears
/// its profile's suspicion permanently (`has_tcp` pins the score at 0).
pub struct Reflex {
    enabled: bool,
    mode: Mode,
    threshold: f64,
    profiles: DashMap<IpAddr, Profile>,
}

impl Reflex {
    pub fn new(enabled: bool, mode: Mode, threshold: f64) -> Self {
        Self {
            enabled,
            mode,
            threshold,
            profiles: DashMap::new(),
        }
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.profiles
            .retain(|_, p| now.duration_since(p.last_seen) < SWEEP_IDLE);
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

    fn evict_if_full(&self) {
        if self.profiles.len() < MAX_ENTRIES {
            return;
        }
        if let Some(oldest) = self
            .profiles
            .iter()
            .min_by_key(|e| e.value().last_seen)
            .map(|e| *e.key())
        {
            self.profiles.remove(&oldest);
        }
    }

    fn touch_tcp(&self, ip: IpAddr) {
        self.evict_if_full();
        let mut entry = self.profiles.entry(ip).or_insert_with(Profile::new);
        entry.has_tcp = true;
        entry.last_seen = Instant::now();
    }

    fn record_query(&self, ip: IpAddr, qtype: QueryType, request_bytes: u64) -> f64 {
        self.evict_if_full();
        let mut entry = self.profiles.entry(ip).or_insert_with(Profile::new);
        entry.last_seen = Instant::now();
        entry.total_queries += 1;
        entry.total_request_bytes += request_bytes;
        entry.query_types_bitmap |= type_bit(qtype);
        if is_normal_qtype(qtype) {
            entry.has_normal_q = true;
        }
        let factor = amp_factor(qtype);
        entry.total_amp_factor += factor;
        if factor > 3.0 {
            entry.high_amp_queries += 1;
        }
        entry.score()
    }

    fn record_response(&self, ip: IpAddr, response_bytes: u64) {
        if let Some(mut entry) = self.profiles.get_mut(&ip) {
            entry.total_response_bytes += response_bytes;
        }
    }
}

#[async_trait::async_trait]
impl Handler for Reflex {
    fn name(&self) -> &'static str {
        "reflex"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        if !self.enabled || ctx.internal() || ctx.remote_ip().is_loopback() {
            chain.next(ctx, request, writer).await;
            return;
        }

        if ctx.proto == Proto::Tcp {
            self.touch_tcp(ctx.remote_ip());
            chain.next(ctx, request, writer).await;
            return;
        }

        let Some(question) = request.questions.first().cloned() else {
            chain.next(ctx, request, writer).await;
            return;
        };

        let ip = ctx.remote_ip();
        let request_bytes = question.name.len() as u64 + 16;
        let score = self.record_query(ip, question.qtype, request_bytes);

        let blocked = matches!(self.mode, Mode::Block) && score >= self.threshold;
        if matches!(self.mode, Mode::Learning | Mode::Block | Mode::Monitor) && score >= self.threshold {
            tracing::warn!(%ip, score, "reflex flagged client");
        }

        if blocked {
            chain.cancel_with_rcode(request, writer, ResponseCode::Refused, request.dnssec_ok());
            return;
        }

        chain.next(ctx, request, writer).await;
        if let Some(msg) = writer.msg() {
            let response_bytes = estimate_size(msg);
            self.record_response(ip, response_bytes);
        }
    }
}

fn estimate_size(msg: &DnsPacket) -> u64 {
    let mut size = 12u64;
    for q in &msg.questions {
        size += q.name.len() as u64 + 5;
    }
    for r in msg.answers.iter().chain(&msg.authorities).chain(&msg.resources) {
        size += r.domain().len() as u64 + 16;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_exonerated_profile() -> Profile {
        let mut p = Profile::new();
        p.has_tcp = true;
        p.total_queries = 1000;
        p
    }

    #[test]
    fn tcp_profile_always_scores_zero() {
        assert_eq!(tcp_exonerated_profile().score(), 0.0);
    }

    #[test]
    fn below_ten_queries_scores_zero() {
        let mut p = Profile::new();
        p.total_queries = 5;
        assert_eq!(p.score(), 0.0);
    }

    #[test]
    fn high_rate_single_type_amplification_scores_high() {
        let mut p = Profile::new();
        p.total_queries = 100;
        p.high_amp_queries = 95;
        p.query_types_bitmap = type_bit(QueryType::DNSKEY);
        p.total_response_bytes = 200_000;
        p.total_request_bytes = 5_000;
        p.last_seen = p.first_seen + Duration::from_secs(2);
        assert!(p.score() > 0.5);
    }

    #[test]
    fn diverse_normal_traffic_scores_low() {
        let mut p = Profile::new();
        p.total_queries = 40;
        p.has_normal_q = true;
        p.query_types_bitmap = type_bit(QueryType::A)
            | type_bit(QueryType::AAAA)
            | type_bit(QueryType::MX)
            | type_bit(QueryType::TXT);
        p.last_seen = p.first_seen + Duration::from_secs(30);
        assert!(p.score() < 0.2);
    }
}
