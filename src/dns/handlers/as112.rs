use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::emptyzone::EmptyZoneSet;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::record::Record;
use redoubt_proto::packet::{DnsPacket, QueryType};

fn soa_for(zone: &str) -> Record {
    Record::SOA {
        domain: zone.to_string(),
        primary_ns: zone.to_string(),
        mailbox: ".".to_string(),
        serial: 0,
        refresh: 28_800,
        retry: 7_200,
        expire: 604_800,
        minimum_ttl: 86_400,
        ttl: 86_400,
    }
}

fn ns_for(zone: &str) -> Record {
    Record::NS {
        domain: zone.to_string(),
        host: zone.to_string(),
        ttl: 86_400,
    }
}

/// Serves RFC 6303-style empty zones for private-use and special-use
/// reverse DNS space so those queries never leave the resolver.
pub struct As112 {
    zones: EmptyZoneSet,
}

impl As112 {
    pub fn new(zones: EmptyZoneSet) -> Self {
        Self { zones }
    }
}

#[async_trait::async_trait]
impl Handler for As112 {
    fn name(&self) -> &'static str {
        "as112"
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

        if !question.name.to_ascii_lowercase().ends_with("arpa.") {
            chain.next(ctx, request, writer).await;
            return;
        }

        let matched = if question.qtype == QueryType::DS {
            self.zones.find_for_ds(&question.name)
        } else {
            self.zones.find_longest_match(&question.name)
        };

        let Some(zone) = matched.map(str::to_string) else {
            chain.next(ctx, request, writer).await;
            return;
        };

        let is_owner = question.name.eq_ignore_ascii_case(&zone);
        let mut reply = DnsPacket::response_from(request);
        reply.header.authoritative_answer = true;
        reply.header.recursion_available = true;
        reply.header.response_code = if is_owner {
            ResponseCode::NoError
        } else {
            ResponseCode::NameError
        };

        match question.qtype {
            QueryType::NS if is_owner => reply.answers.push(ns_for(&zone)),
            QueryType::SOA if is_owner => reply.answers.push(soa_for(&zone)),
            _ => reply.authorities.push(soa_for(&zone)),
        }

        let _ = writer.write_msg(reply);
        chain.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::Proto;
    use crate::dns::registry::Registry;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::Header;
    use redoubt_proto::packet::question::Question;

    fn chain() -> Chain {
        let mut registry = Registry::new();
        registry.append(Box::new(As112::new(EmptyZoneSet::default())));
        Chain::new(registry.build())
    }

    #[tokio::test]
    async fn soa_of_parent_zone() {
        let mut chain = chain();
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("10.in-addr.arpa.".into(), QueryType::SOA));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().unwrap();
        assert_eq!(msg.header.response_code, ResponseCode::NoError);
        assert!(msg.header.authoritative_answer);
        match &msg.answers[0] {
            Record::SOA { primary_ns, ttl, .. } => {
                assert_eq!(primary_ns, "10.in-addr.arpa.");
                assert_eq!(*ttl, 86_400);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn nxdomain_for_subzone() {
        let mut chain = chain();
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("10.10.in-addr.arpa.".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().unwrap();
        assert_eq!(msg.header.response_code, ResponseCode::NameError);
        assert_eq!(msg.authorities.len(), 1);
    }

    #[tokio::test]
    async fn delegates_unrelated_names() {
        let mut chain = chain();
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("example.com.".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert!(!writer.written());
    }
}
