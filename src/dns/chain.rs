use crate::dns::context::Context;
use crate::dns::writer::ResponseWriter;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::record::Record;
use redoubt_proto::packet::DnsPacket;
use std::sync::Arc;

/// One step of the pipeline. Implementations either write a reply and
/// call `chain.cancel()`/`chain.cancel_with_rcode(...)`, or delegate to
/// the rest of the pipeline via `chain.next(...)`. A handler that does
/// neither silently drops the query once the chain runs out of stages.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    );
}

#[async_trait::async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn serve_dns(
        &self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
        chain: &mut Chain,
    ) {
        (**self).serve_dns(ctx, request, writer, chain).await;
    }
}

/// Executes a fixed, ordered list of handlers against one request. A
/// fresh `Chain` is built per query from the process-wide handler list
/// assembled by the registry; the cursor alone is request-local state.
pub struct Chain {
    handlers: Arc<[Box<dyn Handler>]>,
    cursor: usize,
}

impl Chain {
    pub fn new(handlers: Arc<[Box<dyn Handler>]>) -> Self {
        Self { handlers, cursor: 0 }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Invokes the next handler in line, if any remain. Re-entrant: a
    /// handler may call `next` more than once per query only by
    /// constructing its own sub-chain, never by calling this one twice.
    pub async fn next(
        &mut self,
        ctx: &mut Context,
        request: &mut DnsPacket,
        writer: &mut dyn ResponseWriter,
    ) {
        let Some(idx) = (self.cursor < self.handlers.len()).then_some(self.cursor) else {
            return;
        };
        self.cursor += 1;
        let handlers = self.handlers.clone();
        handlers[idx].serve_dns(ctx, request, writer, self).await;
    }

    /// Ends the chain without producing a reply: the query is dropped.
    pub fn cancel(&mut self) {
        self.cursor = self.handlers.len();
    }

    /// Ends the chain, synthesizing a minimal reply with the given rcode
    /// if nothing has written a response yet. `do_bit` is echoed onto the
    /// reply's OPT record (if `request` carried one via `response_from`).
    pub fn cancel_with_rcode(
        &mut self,
        request: &DnsPacket,
        writer: &mut dyn ResponseWriter,
        rcode: ResponseCode,
        do_bit: bool,
    ) {
        if !writer.written() {
            let mut reply = DnsPacket::response_from(request);
            reply.header.response_code = rcode;
            reply.header.recursion_available = true;
            if let Some(Record::Opt(opt)) = reply
                .resources
                .iter_mut()
                .find(|r| matches!(r, Record::Opt(_)))
            {
                opt.dnssec_ok = do_bit;
            }
            let _ = writer.write_msg(reply);
        }
        self.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::Proto;
    use crate::dns::writer::BaseWriter;
    use redoubt_proto::packet::header::Header;

    struct Cancels;

    #[async_trait::async_trait]
    impl Handler for Cancels {
        fn name(&self) -> &'static str {
            "cancels"
        }

        async fn serve_dns(
            &self,
            _ctx: &mut Context,
            request: &mut DnsPacket,
            writer: &mut dyn ResponseWriter,
            chain: &mut Chain,
        ) {
            chain.cancel_with_rcode(request, writer, ResponseCode::Refused, false);
        }
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl Handler for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        async fn serve_dns(
            &self,
            _ctx: &mut Context,
            _request: &mut DnsPacket,
            _writer: &mut dyn ResponseWriter,
            _chain: &mut Chain,
        ) {
            panic!("should never run after cancel_with_rcode");
        }
    }

    #[tokio::test]
    async fn cancel_with_rcode_stops_the_chain() {
        let handlers: Arc<[Box<dyn Handler>]> =
            Arc::from(vec![Box::new(Cancels) as Box<dyn Handler>, Box::new(Unreachable)]);
        let mut chain = Chain::new(handlers);
        let mut ctx = Context::new("10.0.0.1:53".parse().unwrap(), Proto::Udp);
        let mut request = DnsPacket::new(Header::question(7));
        let mut writer = BaseWriter::new("10.0.0.1".parse().unwrap(), Proto::Udp, false);

        chain.next(&mut ctx, &mut request, &mut writer).await;

        assert!(writer.written());
        assert_eq!(writer.rcode(), Some(ResponseCode::Refused));
        assert!(chain.is_done());
    }
}
