use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::hosts::HostsFile;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::record::Record;
use redoubt_proto::packet::{DnsPacket, QueryType};
use std::sync::Arc;

const HOSTS_TTL: u32 = 3600;

fn ptr_target(name: &str) -> Option<String> {
    let stripped = name.trim_end_matches('.');
    if let Some(labels) = stripped.strip_suffix(".in-addr.arpa") {
        let mut parts: Vec<&str> = labels.split('.').collect();
        parts.reverse();
        return Some(parts.join("."));
    }
    if let Some(labels) = stripped.strip_suffix(".ip6.arpa") {
        let nibbles: Vec<&str> = labels.split('.').rev().collect();
        let hex: String = nibbles.concat();
        let mut groups = Vec::with_capacity(8);
        for chunk in hex.as_bytes().chunks(4) {
            groups.push(std::str::from_utf8(chunk).ok()?.to_string());
        }
        return Some(groups.join(":"));
    }
    None
}

/// Answers A/AAAA/PTR from a local hosts file, refreshed on mtime/size
/// change by the background task spawned alongside this handler. Falls
/// through to the rest of the chain for anything the file doesn't know.
pub struct HostsFileSynthesizer {
    hosts: Arc<HostsFile>,
}

impl HostsFileSynthesizer {
    pub fn new(hosts: Arc<HostsFile>) -> Self {
        Self { hosts }
    }
}

#[async_trait::async_trait]
impl Handler for HostsFileSynthesizer {
    fn name(&self) -> &'static str {
        "hostfile"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        let Some(question) = request.questions.first().cloned() else {
            chain.next(ctx, request, writer).await;
            return;
        };

        let map = self.hosts.snapshot().await;

        let answers = match question.qtype {
            QueryType::A => map
                .lookup_v4(&question.name)
                .into_iter()
                .map(|addr| Record::A {
                    domain: question.name.clone(),
                    addr,
                    ttl: HOSTS_TTL,
                })
                .collect::<Vec<_>>(),
            QueryType::AAAA => map
                .lookup_v6(&question.name)
                .into_iter()
                .map(|addr| Record::AAAA {
                    domain: question.name.clone(),
                    addr,
                    ttl: HOSTS_TTL,
                })
                .collect::<Vec<_>>(),
            QueryType::PTR => match ptr_target(&question.name) {
                Some(addr) => map
                    .lookup_ptr(&addr)
                    .into_iter()
                    .map(|host| Record::PTR {
                        domain: question.name.clone(),
                        host: format!("{host}."),
                        ttl: HOSTS_TTL,
                    })
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            },
            _ => {
                chain.next(ctx, request, writer).await;
                return;
            }
        };

        if !answers.is_empty() {
            let mut reply = DnsPacket::response_from(request);
            reply.header.authoritative_answer = true;
            reply.header.recursion_available = true;
            reply.answers = answers;
            let _ = writer.write_msg(reply);
            chain.cancel();
            return;
        }

        // Name exists under a sibling type (e.g. AAAA-only host asked for
        // A): answer NOERROR with no records rather than falling through
        // to the resolver, matching how authoritative zones behave.
        if map.has_any(&question.name) {
            let mut reply = DnsPacket::response_from(request);
            reply.header.authoritative_answer = true;
            reply.header.recursion_available = true;
            let _ = writer.write_msg(reply);
            chain.cancel();
            return;
        }

        chain.next(ctx, request, writer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::Proto;
    use crate::dns::hosts::HostsMap;
    use crate::dns::registry::Registry;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::Header;
    use redoubt_proto::packet::question::Question;

    fn hosts_with(content: &str) -> Arc<HostsFile> {
        Arc::new(HostsFile::preloaded(HostsMap::parse(content)))
    }

    #[test]
    fn ptr_target_parses_v4_reverse_name() {
        assert_eq!(
            ptr_target("5.0.0.10.in-addr.arpa."),
            Some("10.0.0.5".to_string())
        );
    }

    #[tokio::test]
    async fn falls_through_when_file_empty() {
        let hosts = hosts_with("");
        let mut registry = Registry::new();
        registry.append(Box::new(HostsFileSynthesizer::new(hosts)));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("thor.".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;
        assert!(!writer.written());
    }

    #[tokio::test]
    async fn answers_a_from_hosts_file() {
        let hosts = hosts_with("127.1.1.1 thor\n");
        let mut registry = Registry::new();
        registry.append(Box::new(HostsFileSynthesizer::new(hosts)));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("thor".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().expect("should answer");
        assert_eq!(msg.answers.len(), 1);
        match &msg.answers[0] {
            Record::A { addr, ttl, .. } => {
                assert_eq!(*addr, std::net::Ipv4Addr::new(127, 1, 1, 1));
                assert_eq!(*ttl, HOSTS_TTL);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
