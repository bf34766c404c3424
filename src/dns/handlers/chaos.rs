use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::question::DnsClass;
use redoubt_proto::packet::record::Record;
use redoubt_proto::packet::{DnsPacket, QueryType};
use sha2::{Digest, Sha256};

/// Answers `CHAOS/TXT` identification queries, the same convention BIND
/// and most recursive resolvers implement for `version.bind.` and
/// friends. Anything else in the CHAOS class, or any other class/type,
/// is delegated.
pub struct ChaosResponder {
    enabled: bool,
    identity: String,
    version: String,
    nsid: Option<String>,
}

impl ChaosResponder {
    pub fn new(enabled: bool, identity: String, version: String, nsid: Option<String>) -> Self {
        Self {
            enabled,
            identity,
            version,
            nsid,
        }
    }

    fn answer_for(&self, name: &str) -> Option<String> {
        match name.trim_end_matches('.').to_ascii_lowercase().as_str() {
            "version.bind" | "version.server" => Some(format!("SDNS v{}", self.version)),
            "hostname.bind" | "id.server" => Some(self.identity.clone()),
            "fingerprint.bind" => {
                let mut hasher = Sha256::new();
                hasher.update(self.identity.as_bytes());
                hasher.update(self.version.as_bytes());
                let digest = hasher.finalize();
                Some(hex::encode(&digest[0..8]))
            }
            "nsid.bind" => self.nsid.clone(),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl Handler for ChaosResponder {
    fn name(&self) -> &'static str {
        "chaos"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        let Some(question) = request.questions.first() else {
            chain.next(ctx, request, writer).await;
            return;
        };

        let is_chaos_txt = self.enabled
            && question.qclass == DnsClass::Chaos
            && question.qtype == QueryType::TXT;

        if !is_chaos_txt {
            chain.next(ctx, request, writer).await;
            return;
        }

        match self.answer_for(&question.name) {
            Some(text) => {
                let mut reply = DnsPacket::response_from(request);
                reply.header.authoritative_answer = true;
                reply.header.recursion_available = true;
                reply.answers.push(Record::TXT {
                    domain: question.name.clone(),
                    text: vec![text],
                    ttl: 0,
                });
                let _ = writer.write_msg(reply);
                chain.cancel();
            }
            None => chain.next(ctx, request, writer).await,
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

    fn chain_with(responder: ChaosResponder) -> Chain {
        let mut registry = Registry::new();
        registry.append(Box::new(responder));
        Chain::new(registry.build())
    }

    #[tokio::test]
    async fn answers_version_bind() {
        let mut chain = chain_with(ChaosResponder::new(
            true,
            "resolver-1".into(),
            "9.9.9".into(),
            None,
        ));
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1)).with_question(Question {
            name: "version.bind.".into(),
            qtype: QueryType::TXT,
            qclass: DnsClass::Chaos,
        });
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        let msg = writer.msg().expect("should answer");
        assert_eq!(msg.answers.len(), 1);
        match &msg.answers[0] {
            Record::TXT { text, .. } => assert_eq!(text[0], "SDNS v9.9.9"),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn delegates_non_chaos_queries() {
        let mut chain = chain_with(ChaosResponder::new(true, "r".into(), "1".into(), None));
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(1)).with_question(Question::new(
            "example.com".into(),
            QueryType::A,
        ));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert!(!writer.written());
    }
}
