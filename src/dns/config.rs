use crate::dns::cookie::CookieSecret;
use crate::dns::emptyzone::EmptyZoneSet;
use crate::dns::handlers::reflex::Mode;
use redoubt_resolver::udp::UdpResolver;
use redoubt_resolver::{Manager, ManagerBuilder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, serde::Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,
    #[serde(default)]
    pub bindtls: String,
    #[serde(default)]
    pub binddoh: String,
    #[serde(default)]
    pub binddoq: String,
    #[serde(default)]
    pub tlscertificate: String,
    #[serde(default)]
    pub tlsprivatekey: String,
    #[serde(default)]
    pub outboundips: Vec<Ipv4Addr>,
    #[serde(default)]
    pub outboundip6s: Vec<Ipv6Addr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            bindtls: String::new(),
            binddoh: String::new(),
            binddoq: String::new(),
            tlscertificate: String::new(),
            tlsprivatekey: String::new(),
            outboundips: Vec::new(),
            outboundip6s: Vec::new(),
        }
    }
}

impl ServerConfig {
    fn default_bind() -> String {
        "0.0.0.0:53".to_string()
    }

    pub fn address(&self) -> SocketAddr {
        self.bind.parse().unwrap_or_else(|_| {
            SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53))
        })
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub rootservers: Vec<String>,
    #[serde(default)]
    pub root6servers: Vec<String>,
    #[serde(default)]
    pub rootkeys: Vec<String>,
    #[serde(default = "ResolverConfig::default_dnssec")]
    pub dnssec: String,
    #[serde(default)]
    pub fallbackservers: Vec<String>,
    #[serde(default = "ResolverConfig::default_forwarders")]
    pub forwarderservers: Vec<String>,
    #[serde(default = "ResolverConfig::default_timeout")]
    pub timeout: u64,
    #[serde(default = "ResolverConfig::default_query_timeout")]
    pub querytimeout: u64,
    #[serde(default = "ResolverConfig::default_expire")]
    pub expire: u64,
    #[serde(default = "ResolverConfig::default_cache_size")]
    pub cachesize: u64,
    #[serde(default)]
    pub prefetch: bool,
    #[serde(default = "ResolverConfig::default_max_depth")]
    pub maxdepth: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            rootservers: Vec::new(),
            root6servers: Vec::new(),
            rootkeys: Vec::new(),
            dnssec: Self::default_dnssec(),
            fallbackservers: Vec::new(),
            forwarderservers: Self::default_forwarders(),
            timeout: Self::default_timeout(),
            querytimeout: Self::default_query_timeout(),
            expire: Self::default_expire(),
            cachesize: Self::default_cache_size(),
            prefetch: false,
            maxdepth: Self::default_max_depth(),
        }
    }
}

impl ResolverConfig {
    fn default_dnssec() -> String {
        "on".to_string()
    }

    fn default_forwarders() -> Vec<String> {
        vec!["1.1.1.1:53".to_string(), "1.0.0.1:53".to_string()]
    }

    fn default_timeout() -> u64 {
        2000
    }

    fn default_query_timeout() -> u64 {
        5000
    }

    fn default_expire() -> u64 {
        86_400
    }

    fn default_cache_size() -> u64 {
        10_000
    }

    fn default_max_depth() -> u32 {
        30
    }

    /// Builds the forwarder's `Manager`: one `UdpResolver` per configured
    /// forwarder, falling back to `fallbackservers` after them, all tried
    /// in order on every query.
    pub fn build(&self) -> Manager {
        let bind = SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        let timeout = Duration::from_millis(self.timeout);
        let mut builder = ManagerBuilder::default();
        for (idx, upstream) in self
            .forwarderservers
            .iter()
            .chain(self.fallbackservers.iter())
            .enumerate()
        {
            let Ok(addr) = upstream.parse::<SocketAddr>() else {
                tracing::warn!("ignoring invalid upstream address {upstream:?}");
                continue;
            };
            let resolver = UdpResolver::new(format!("upstream-{idx}"), addr, bind).with_timeout(timeout);
            builder.add_resolver(Box::new(resolver));
        }
        builder
            .build()
            .expect("resolver config must declare at least one valid upstream")
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct AccessListConfig {
    #[serde(default = "AccessListConfig::default_cidrs")]
    pub cidrs: Vec<String>,
}

impl Default for AccessListConfig {
    fn default() -> Self {
        Self {
            cidrs: Self::default_cidrs(),
        }
    }
}

impl AccessListConfig {
    fn default_cidrs() -> Vec<String> {
        vec!["0.0.0.0/0".to_string(), "::/0".to_string()]
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct HostsConfig {
    #[serde(default)]
    pub hostsfile: String,
    #[serde(default)]
    pub emptyzones: Vec<String>,
}

impl HostsConfig {
    pub fn build_zones(&self) -> EmptyZoneSet {
        EmptyZoneSet::default().with_extra(self.emptyzones.clone())
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RatelimitConfig {
    #[serde(default)]
    pub ratelimit: u32,
    #[serde(default)]
    pub clientratelimit: u32,
    #[serde(default)]
    pub cookiesecret: String,
}

impl RatelimitConfig {
    pub fn secret(&self) -> CookieSecret {
        if self.cookiesecret.is_empty() {
            CookieSecret::generate()
        } else {
            CookieSecret::from_hex(&self.cookiesecret).unwrap_or_else(CookieSecret::generate)
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ChaosConfig {
    #[serde(default)]
    pub nsid: String,
    #[serde(default = "ChaosConfig::default_enabled")]
    pub chaos: bool,
    #[serde(default)]
    pub qname_min_level: u8,
    #[serde(skip, default = "ChaosConfig::default_identity")]
    pub identity: String,
    #[serde(skip, default = "ChaosConfig::default_version")]
    pub version: String,
    #[serde(skip)]
    pub enabled: bool,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            nsid: String::new(),
            chaos: Self::default_enabled(),
            qname_min_level: 0,
            identity: Self::default_identity(),
            version: Self::default_version(),
            enabled: Self::default_enabled(),
        }
    }
}

impl ChaosConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_identity() -> String {
        env!("CARGO_PKG_NAME").to_string()
    }

    fn default_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    pub fn finish(mut self) -> Self {
        self.enabled = self.chaos;
        self.identity = Self::default_identity();
        self.version = Self::default_version();
        self
    }

    pub fn nsid(&self) -> Option<String> {
        if self.nsid.is_empty() {
            None
        } else {
            Some(self.nsid.clone())
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub accesslog: String,
    #[serde(default)]
    pub dnstapsocket: String,
    #[serde(default)]
    pub dnstapidentity: String,
    #[serde(default)]
    pub dnstapversion: String,
    #[serde(default = "LoggingConfig::default_true")]
    pub dnstaplogqueries: bool,
    #[serde(default = "LoggingConfig::default_true")]
    pub dnstaplogresponses: bool,
    #[serde(default = "LoggingConfig::default_flush_interval")]
    pub dnstapflushinterval: u64,
}

impl LoggingConfig {
    fn default_true() -> bool {
        true
    }

    fn default_flush_interval() -> u64 {
        5
    }

    pub fn accesslog_enabled(&self) -> bool {
        !self.accesslog.is_empty()
    }

    pub fn dnstap_socket(&self) -> Option<std::path::PathBuf> {
        if self.dnstapsocket.is_empty() {
            None
        } else {
            Some(std::path::PathBuf::from(&self.dnstapsocket))
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ReflexConfig {
    #[serde(default)]
    pub reflexenabled: bool,
    #[serde(default)]
    pub reflexblockmode: bool,
    #[serde(default)]
    pub reflexlearningmode: bool,
    #[serde(default = "ReflexConfig::default_threshold")]
    pub reflexthreshold: f64,
    #[serde(skip)]
    pub enabled: bool,
    #[serde(skip)]
    pub threshold: f64,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            reflexenabled: false,
            reflexblockmode: false,
            reflexlearningmode: false,
            reflexthreshold: Self::default_threshold(),
            enabled: false,
            threshold: Self::default_threshold(),
        }
    }
}

impl ReflexConfig {
    fn default_threshold() -> f64 {
        0.70
    }

    pub fn finish(mut self) -> Self {
        self.enabled = self.reflexenabled;
        self.threshold = self.reflexthreshold;
        self
    }

    pub fn mode(&self) -> Mode {
        if self.reflexblockmode {
            Mode::Block
        } else if self.reflexlearningmode {
            Mode::Learning
        } else {
            Mode::Monitor
        }
    }
}
