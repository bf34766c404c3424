use crate::dns::cache::CacheService;
use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::DnsPacket;
use std::sync::Arc;

/// Answers straight from cache on a hit; otherwise runs the rest of the
/// chain (the forwarder, typically) and persists whatever it came back
/// with before returning.
pub struct CacheHandler {
    cache: Arc<dyn CacheService>,
}

impl CacheHandler {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl Handler for CacheHandler {
    fn name(&self) -> &'static str {
        "cache"
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

        if let Some(records) = self.cache.request(&question.name, question.qtype).await {
            let mut reply = DnsPacket::response_from(request);
            reply.header.recursion_available = true;
            reply.answers = records;
            let _ = writer.write_msg(reply);
            chain.cancel();
            return;
        }

        chain.next(ctx, request, writer).await;

        if let Some(msg) = writer.msg() {
            if !msg.answers.is_empty() {
                self.cache
                    .persist(&question.name, question.qtype, msg.answers.clone())
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::cache::MemoryCacheService;
    use crate::dns::context::Proto;
    use crate::dns::registry::Registry;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::{Header, ResponseCode};
    use redoubt_proto::packet::question::Question;
    use redoubt_proto::packet::record::Record;
    use redoubt_proto::packet::QueryType;
    use std::net::Ipv4Addr;

    struct Answers;

    #[async_trait::async_trait]
    impl Handler for Answers {
        fn name(&self) -> &'static str {
            "answers"
        }

        async fn serve_dns(
            &self,
            _ctx: &mut Context,
            request: &mut DnsPacket,
            writer: &mut dyn ResponseWriter,
            chain: &mut Chain,
        ) {
            let mut reply = DnsPacket::response_from(request);
            reply.header.response_code = ResponseCode::NoError;
            reply.answers.push(Record::A {
                domain: "perdu.com".into(),
                addr: Ipv4Addr::new(1, 2, 3, 4),
                ttl: 60,
            });
            let _ = writer.write_msg(reply);
            chain.cancel();
        }
    }

    #[tokio::test]
    async fn miss_delegates_then_persists() {
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCacheService::new(10));
        let mut registry = Registry::new();
        registry.append(Box::new(CacheHandler::new(cache.clone())));
        registry.append(Box::new(Answers));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("perdu.com".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert!(writer.written());
        assert!(cache.request("perdu.com", QueryType::A).await.is_some());
    }

    #[tokio::test]
    async fn hit_short_circuits_the_chain() {
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCacheService::new(10));
        cache
            .persist(
                "perdu.com",
                QueryType::A,
                vec![Record::A {
                    domain: "perdu.com".into(),
                    addr: Ipv4Addr::new(9, 9, 9, 9),
                    ttl: 60,
                }],
            )
            .await;

        let mut registry = Registry::new();
        registry.append(Box::new(CacheHandler::new(cache)));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("perdu.com".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().unwrap();
        match &msg.answers[0] {
            Record::A { addr, .. } => assert_eq!(*addr, Ipv4Addr::new(9, 9, 9, 9)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
