pub mod accesslist;
pub mod accesslog;
pub mod as112;
pub mod blocklist;
pub mod cache;
pub mod chaos;
pub mod dnstap;
pub mod forwarder;
pub mod hostsfile;
pub mod loop_detect;
pub mod ratelimit;
pub mod recovery;
pub mod reflex;

pub use accesslist::AccessList;
pub use accesslog::AccessLog;
pub use as112::As112;
pub use blocklist::Blocklist;
pub use cache::CacheHandler;
pub use chaos::ChaosResponder;
pub use dnstap::Dnstap;
pub use forwarder::Forwarder;
pub use hostsfile::HostsFileSynthesizer;
pub use loop_detect::LoopDetector;
pub use ratelimit::RateLimiter;
pub use recovery::Recovery;
pub use reflex::Reflex;
