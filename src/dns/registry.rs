use crate::dns::chain::{Chain, Handler};
use std::sync::Arc;

/// Builds the ordered handler list the chain runs per query. Registration
/// happens once at startup (`cmd::serve`); the assembled list is then
/// immutable and shared via `Arc` across every request's `Chain`.
#[derive(Default)]
pub struct Registry {
    entries: Vec<(&'static str, Box<dyn Handler>)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, handler: Box<dyn Handler>) -> &mut Self {
        let name = handler.name();
        self.entries.push((name, handler));
        self
    }

    pub fn insert_at(&mut self, index: usize, handler: Box<dyn Handler>) -> &mut Self {
        let name = handler.name();
        let index = index.min(self.entries.len());
        self.entries.insert(index, (name, handler));
        self
    }

    /// Inserts `handler` immediately before the first handler registered
    /// under `before`. No-op (appends at the end) if `before` isn't found,
    /// since a missing anchor is a configuration mistake, not a reason to
    /// silently drop the handler.
    pub fn insert_before(&mut self, before: &'static str, handler: Box<dyn Handler>) -> &mut Self {
        match self.entries.iter().position(|(name, _)| *name == before) {
            Some(index) => self.insert_at(index, handler),
            None => self.append(handler),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    /// Freezes registration and hands back a template chain. Every
    /// in-flight request clones this cheaply (`Arc` bump) and gets its own
    /// cursor via `Chain::new`.
    pub fn build(self) -> Arc<[Box<dyn Handler>]> {
        Arc::from(self.entries.into_iter().map(|(_, h)| h).collect::<Vec<_>>())
    }

    pub fn build_chain(handlers: &Arc<[Box<dyn Handler>]>) -> Chain {
        Chain::new(handlers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::Context;
    use crate::dns::writer::ResponseWriter;
    use redoubt_proto::packet::DnsPacket;

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl Handler for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn serve_dns(
            &self,
            _ctx: &mut Context,
            _request: &mut DnsPacket,
            _writer: &mut dyn ResponseWriter,
            chain: &mut crate::dns::chain::Chain,
        ) {
            chain.cancel();
        }
    }

    #[test]
    fn insert_before_respects_anchor() {
        let mut registry = Registry::new();
        registry.append(Box::new(Named("recovery")));
        registry.append(Box::new(Named("forwarder")));
        registry.insert_before("forwarder", Box::new(Named("ratelimit")));

        assert_eq!(registry.names(), vec!["recovery", "ratelimit", "forwarder"]);
    }

    #[test]
    fn insert_before_missing_anchor_appends() {
        let mut registry = Registry::new();
        registry.append(Box::new(Named("recovery")));
        registry.insert_before("nonexistent", Box::new(Named("ratelimit")));

        assert_eq!(registry.names(), vec!["recovery", "ratelimit"]);
    }
}
