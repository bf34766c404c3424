use redoubt_proto::packet::{DnsPacket, QueryType};

#[derive(Clone, Debug)]
pub enum ResolverError {
    Unknown,
    Timeout,
    Io(String),
    InvalidResponse(String),
}

impl std::fmt::Display for ResolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown resolver error"),
            Self::Timeout => write!(f, "upstream exchange timed out"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ResolverError {}

#[async_trait::async_trait]
pub trait Resolver: std::fmt::Debug {
    fn kind(&self) -> &'static str;
    fn identifier(&self) -> &str;

    async fn resolve(&self, kind: QueryType, hostname: &str) -> Result<DnsPacket, ResolverError>;
}
