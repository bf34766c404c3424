use moka::future::Cache;
use redoubt_proto::packet::record::Record;
use redoubt_proto::packet::QueryType;
use std::ops::Add;
use std::time::{Duration, SystemTime};

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_size")]
    size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self { size: 1000 }
    }
}

impl Config {
    pub fn default_size() -> u64 {
        1000
    }

    pub fn build(self) -> MemoryCacheService {
        MemoryCacheService::new(self.size)
    }
}

#[async_trait::async_trait]
pub trait CacheService: std::fmt::Debug + Send + Sync {
    async fn persist(&self, qname: &str, qtype: QueryType, records: Vec<Record>);
    async fn request(&self, qname: &str, qtype: QueryType) -> Option<Vec<Record>>;
}

#[derive(Debug)]
pub struct MemoryCacheService {
    inner: Cache<(String, QueryType), (SystemTime, Vec<Record>)>,
}

impl MemoryCacheService {
    pub fn new(size: u64) -> Self {
        Self {
            inner: Cache::new(size),
        }
    }
}

#[async_trait::async_trait]
impl CacheService for MemoryCacheService {
    #[tracing::instrument(skip(self, records))]
    async fn persist(&self, qname: &str, qtype: QueryType, records: Vec<Record>) {
        if let Some(min_ttl) = records.iter().map(|item| item.ttl()).min() {
            if min_ttl == 0 {
                return;
            }
            tracing::debug!("persisting with a ttl of {min_ttl} seconds");
            let deadline = SystemTime::now().add(Duration::new(min_ttl as u64, 0));
            self.inner
                .insert((qname.to_string(), qtype), (deadline, records))
                .await;
        }
    }

    #[tracing::instrument(skip(self))]
    async fn request(&self, qname: &str, qtype: QueryType) -> Option<Vec<Record>> {
        let key = (qname.to_string(), qtype);
        let (until, records) = self.inner.get(&key)?;
        let now = SystemTime::now();
        match until.duration_since(now) {
            Ok(diff) => {
                tracing::debug!("found in cache with a ttl of {} seconds", diff.as_secs());
                Some(
                    records
                        .iter()
                        .map(|record| record.delayed_ttl(diff.as_secs() as u32))
                        .collect(),
                )
            }
            Err(_) => {
                tracing::debug!("found in cache but expired");
                self.inner.invalidate(&key).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheService, MemoryCacheService};
    use redoubt_proto::packet::{record::Record, QueryType};
    use std::net::Ipv4Addr;
    use std::ops::{Add, Sub};
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn should_persist_in_cache() {
        let srv = MemoryCacheService::new(10);
        srv.persist(
            "perdu.com",
            QueryType::A,
            vec![Record::A {
                domain: "perdu.com".into(),
                addr: Ipv4Addr::new(1, 2, 3, 4),
                ttl: 60,
            }],
        )
        .await;
        let found = srv.inner.get(&("perdu.com".to_string(), QueryType::A));
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn should_not_return_if_outdated() {
        let srv = MemoryCacheService::new(10);
        srv.inner
            .insert(
                ("perdu.com".to_string(), QueryType::A),
                (
                    SystemTime::now().sub(Duration::new(10, 0)),
                    vec![Record::A {
                        domain: "perdu.com".into(),
                        addr: Ipv4Addr::new(1, 2, 3, 4),
                        ttl: 5,
                    }],
                ),
            )
            .await;
        let found = srv.request("perdu.com", QueryType::A).await;
        assert!(found.is_none());
        assert!(srv
            .inner
            .get(&("perdu.com".to_string(), QueryType::A))
            .is_none());
    }

    #[tokio::test]
    async fn should_return_with_delayed_ttl() {
        let srv = MemoryCacheService::new(10);
        srv.inner
            .insert(
                ("perdu.com".to_string(), QueryType::A),
                (
                    SystemTime::now().add(Duration::new(60, 0)),
                    vec![Record::A {
                        domain: "perdu.com".into(),
                        addr: Ipv4Addr::new(1, 2, 3, 4),
                        ttl: 180,
                    }],
                ),
            )
            .await;
        let found = srv.request("perdu.com", QueryType::A).await.unwrap();
        for item in found {
            assert_eq!(item.ttl(), 59);
        }
    }
}
