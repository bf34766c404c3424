use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;

const MAX_REENTRIES: u8 = 10;

/// Breaks recursion loops caused by misconfigured forwarding or a buggy
/// upstream that keeps bouncing the same question back to us.
pub struct LoopDetector;

#[async_trait::async_trait]
impl Handler for LoopDetector {
    fn name(&self) -> &'static str {
        "loop"
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

        let count = ctx.bump_loop_count(&question.name, question.qtype);
        if count > MAX_REENTRIES {
            tracing::warn!(name = %question.name, ?question.qtype, "loop detected, returning SERVFAIL");
            chain.cancel_with_rcode(request, writer, ResponseCode::ServerFailure, request.dnssec_ok());
            return;
        }

        chain.next(ctx, request, writer).await;
    }
}
