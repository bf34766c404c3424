use crate::dns::chain::{Chain, Handler};
use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use futures::FutureExt;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;

/// Outermost handler: catches panics anywhere further down the chain and
/// turns them into SERVFAIL instead of taking the worker task down. This
/// is the sole place a panic is ever caught; every other handler is
/// expected to propagate failures as a written reply or a silent cancel.
pub struct Recovery;

#[async_trait::async_trait]
impl Handler for Recovery {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        let question = request.questions.first().cloned();
        let outcome = std::panic::AssertUnwindSafe(chain.next(ctx, request, writer))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(question = ?question, "panic in handler chain: {message}");
            chain.cancel_with_rcode(request, writer, ResponseCode::ServerFailure, request.dnssec_ok());
        }
    }
}
