use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::DnsPacket;

/// Common-Log-style line emitted after a response is written. Runs
/// `next` first so it always logs the chain's final decision, not the
/// inbound question.
pub struct AccessLog {
    enabled: bool,
}

impl AccessLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait::async_trait]
impl Handler for AccessLog {
    fn name(&self) -> &'static str {
        "accesslog"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        chain.next(ctx, request, writer).await;

        if !self.enabled || ctx.internal() {
            return;
        }

        let Some(msg) = writer.msg() else {
            return;
        };

        let question = msg
            .questions
            .first()
            .map(|q| format!("{} IN {}", q.name, q.qtype))
            .unwrap_or_else(|| "-".to_string());
        let cd_marker = if msg.header.checking_disabled { "+cd" } else { "-cd" };
        let timestamp = chrono::Local::now().format("%d/%b/%Y:%H:%M:%S %z");

        tracing::info!(
            target: "accesslog",
            "{} [{}] \"{}\" {} {} {} {}",
            ctx.remote_ip(),
            timestamp,
            question,
            ctx.proto,
            cd_marker,
            msg.header.response_code,
            estimated_len(msg),
        );
    }
}

fn estimated_len(msg: &DnsPacket) -> usize {
    12 + msg
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
            .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::Proto;
    use crate::dns::registry::Registry;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::{Header, ResponseCode};
    use redoubt_proto::packet::question::Question;
    use redoubt_proto::packet::QueryType;

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
            let _ = writer.write_msg(reply);
            chain.cancel();
        }
    }

    #[tokio::test]
    async fn logs_after_response_without_altering_it() {
        let mut registry = Registry::new();
        registry.append(Box::new(AccessLog::new(true)));
        registry.append(Box::new(Answers));
        let handlers = registry.build();
        let mut chain = Chain::new(handlers);

        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1))
            .with_question(Question::new("example.com".into(), QueryType::A));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert!(writer.written());
        assert_eq!(writer.rcode(), Some(ResponseCode::NoError));
    }
}
