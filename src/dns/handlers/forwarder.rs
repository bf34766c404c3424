use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;
use redoubt_resolver::Manager;
use std::sync::Arc;

/// Terminal-ish handler that hands the first question off to the
/// upstream `Manager`, rewriting the reply onto the original question
/// and id. Anything still unanswered after this runs falls through to
/// whatever's registered next (normally the cache, then end of chain).
pub struct Forwarder {
    manager: Arc<Manager>,
}

impl Forwarder {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

#[async_trait::async_trait]
impl Handler for Forwarder {
    fn name(&self) -> &'static str {
        "forwarder"
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

        match self.manager.resolve(question.qtype, &question.name).await {
            Ok((resolved, errors)) => {
                if !errors.is_empty() {
                    tracing::debug!("forwarder recovered after {} failed upstream(s)", errors.len());
                }
                let mut reply = resolved;
                reply.header.id = request.header.id;
                reply.header.recursion_desired = request.header.recursion_desired;
                reply.header.checking_disabled = request.header.checking_disabled;
                reply.questions = request.questions.clone();
                let _ = writer.write_msg(reply);
                chain.cancel();
            }
            Err(err) => {
                tracing::warn!("forwarder exhausted upstreams: {err:?}");
                chain.cancel_with_rcode(request, writer, ResponseCode::ServerFailure, request.dnssec_ok());
            }
        }
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
    use redoubt_proto::packet::QueryType;
    use redoubt_resolver::mock::MockResolver;
    use redoubt_resolver::ManagerBuilder;

    #[tokio::test]
    async fn answers_from_upstream_preserving_id() {
        let manager = ManagerBuilder::default()
            .with_resolver(Box::new(MockResolver::new("primary").with_query(
                "example.com",
                QueryType::A,
                DnsPacket::new(Header::response(99)),
            )))
            .build()
            .unwrap();

        let mut registry = Registry::new();
        registry.append(Box::new(Forwarder::new(Arc::new(manager))));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(7))
            .with_question(Question::new("example.com".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().expect("should answer");
        assert_eq!(msg.header.id, 7);
        assert_eq!(msg.questions[0].name, "example.com");
    }

    #[tokio::test]
    async fn servfail_when_all_upstreams_fail() {
        let manager = ManagerBuilder::default()
            .with_resolver(Box::new(MockResolver::new("primary")))
            .build()
            .unwrap();

        let mut registry = Registry::new();
        registry.append(Box::new(Forwarder::new(Arc::new(manager))));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("example.com".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert_eq!(writer.rcode(), Some(ResponseCode::ServerFailure));
    }
}
