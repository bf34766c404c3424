pub mod blocklist_service;
pub mod cache;
pub mod chain;
pub mod config;
pub mod context;
pub mod cookie;
pub mod emptyzone;
pub mod handlers;
pub mod hosts;
pub mod registry;
pub mod writer;

use self::blocklist_service::BlocklistService;
use self::cache::CacheService;
use self::cookie::CookieSecret;
use self::emptyzone::EmptyZoneSet;
use self::hosts::HostsFile;
use self::registry::Registry;
use redoubt_resolver::Manager;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a handler factory needs out of the loaded configuration,
/// already turned into live collaborators by their own `build()`.
pub struct Services {
    pub blocklist: Arc<dyn BlocklistService>,
    pub cache: Arc<dyn CacheService>,
    pub manager: Arc<Manager>,
    pub hosts: Arc<HostsFile>,
    pub zones: EmptyZoneSet,
    pub cookie_secret: CookieSecret,
    pub access_cidrs: Vec<String>,
    pub rate_per_minute: u32,
    pub reflex: crate::dns::config::ReflexConfig,
    pub chaos: crate::dns::config::ChaosConfig,
    pub dnstap_socket: Option<PathBuf>,
    pub dnstap_identity: String,
    pub dnstap_version: String,
    pub accesslog_enabled: bool,
}

/// Assembles the standard handler chain: recovery, loop detection,
/// dnstap, access list, rate limiter, reflex, chaos, hosts file, access
/// log, AS112, blocklist, cache, then the forwarder.
pub fn build_registry(services: Services) -> Registry {
    let mut registry = Registry::new();

    registry.append(Box::new(handlers::Recovery));
    registry.append(Box::new(handlers::LoopDetector));

    if let Some(socket) = services.dnstap_socket {
        registry.append(Box::new(handlers::Dnstap::spawn(
            socket,
            services.dnstap_identity,
            services.dnstap_version,
        )));
    }

    registry.append(Box::new(handlers::AccessList::new(&services.access_cidrs)));

    let rate_limiter = Arc::new(handlers::RateLimiter::new(
        services.rate_per_minute,
        services.cookie_secret,
    ));
    rate_limiter.clone().spawn_sweeper();
    registry.append(Box::new(rate_limiter));

    let reflex = Arc::new(handlers::Reflex::new(
        services.reflex.enabled,
        services.reflex.mode(),
        services.reflex.threshold,
    ));
    reflex.clone().spawn_sweeper();
    registry.append(Box::new(reflex));
    let nsid = services.chaos.nsid();
    registry.append(Box::new(handlers::ChaosResponder::new(
        services.chaos.enabled,
        services.chaos.identity,
        services.chaos.version,
        nsid,
    )));
    registry.append(Box::new(handlers::HostsFileSynthesizer::new(services.hosts)));
    registry.append(Box::new(handlers::AccessLog::new(services.accesslog_enabled)));
    registry.append(Box::new(handlers::As112::new(services.zones)));
    registry.append(Box::new(handlers::Blocklist::new(services.blocklist)));
    registry.append(Box::new(handlers::CacheHandler::new(services.cache)));
    registry.append(Box::new(handlers::Forwarder::new(services.manager)));

    registry
}
