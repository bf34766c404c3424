use crate::dns::blocklist_service::BlocklistService;
use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;
use std::sync::Arc;

/// Answers NXDOMAIN for any question whose name is on the blocklist,
/// without ever reaching the forwarder or cache.
pub struct Blocklist {
    service: Arc<dyn BlocklistService>,
}

impl Blocklist {
    pub fn new(service: Arc<dyn BlocklistService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Handler for Blocklist {
    fn name(&self) -> &'static str {
        "blocklist"
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

        if self.service.is_blocked(&question.name).await {
            chain.cancel_with_rcode(request, writer, ResponseCode::NameError, request.dnssec_ok());
            return;
        }

        chain.next(ctx, request, writer).await;
    }
}
