use redoubt_blocklist_loader::BlocklistKind;
use sqlx::{Pool, Sqlite, Transaction};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BlocklistItem {
    pub url: String,
    pub kind: BlocklistKind,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub inner: BTreeMap<String, BlocklistItem>,
}

impl Config {
    pub fn build(self, database: Pool<Sqlite>) -> DatabaseBlocklistService {
        DatabaseBlocklistService::new(self.inner, database)
    }
}

#[async_trait::async_trait]
pub trait BlocklistService: std::fmt::Debug + Send + Sync {
    async fn is_blocked(&self, domain: &str) -> bool;
    async fn import(&self) -> Result<(u64, u64), sqlx::Error>;
}

#[derive(Debug, Clone)]
pub struct DatabaseBlocklistService {
    database: Pool<Sqlite>,
    items: BTreeMap<String, BlocklistItem>,
}

impl DatabaseBlocklistService {
    pub fn new(items: BTreeMap<String, BlocklistItem>, database: Pool<Sqlite>) -> Self {
        Self { items, database }
    }
}

async fn import_list<'t>(
    tx: &mut Transaction<'t, Sqlite>,
    url: &str,
    description: &str,
    hash: &str,
    domains: HashSet<String>,
) -> Result<(u64, u64), sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        r#"SELECT count(id) > 0
FROM blocklists
WHERE url = $1 AND last_refresh_hash = $2"#,
    )
    .bind(url)
    .bind(hash)
    .fetch_one(&mut *tx)
    .await?;
    if exists {
        return Ok((0, 0));
    }

    let blocklist_id: u32 = sqlx::query_scalar(
        r#"INSERT INTO blocklists (url, description, created_at, last_refresh_at, last_refresh_hash)
VALUES ($1, $2, UNIXEPOCH(), UNIXEPOCH(), $3)
ON CONFLICT (url) DO UPDATE SET last_refresh_at = UNIXEPOCH(), last_refresh_hash = $3
RETURNING id"#,
    )
    .bind(url)
    .bind(description)
    .bind(hash)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("CREATE TEMPORARY TABLE import_blocked_domains (domain TEXT UNIQUE NOT NULL)")
        .execute(&mut *tx)
        .await?;

    for item in domains {
        sqlx::query("INSERT INTO import_blocked_domains (domain) VALUES ($1)")
            .bind(&item)
            .execute(&mut *tx)
            .await?;
    }

    let deleted = sqlx::query("DELETE FROM blocked_domains WHERE domain NOT IN (SELECT domain FROM import_blocked_domains) AND blocklist_id = $1")
        .bind(blocklist_id)
        .execute(&mut *tx).await?;

    let inserted = sqlx::query(
        r#"INSERT INTO blocked_domains (blocklist_id, domain, created_at)
SELECT $1 AS blocklist_id, domain, UNIXEPOCH() AS created_at
FROM import_blocked_domains
WHERE true
ON CONFLICT (blocklist_id, domain) DO NOTHING"#,
    )
    .bind(blocklist_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DROP TABLE import_blocked_domains")
        .execute(&mut *tx)
        .await?;

    Ok((inserted.rows_affected(), deleted.rows_affected()))
}

#[async_trait::async_trait]
impl BlocklistService for DatabaseBlocklistService {
    #[tracing::instrument(skip(self))]
    async fn is_blocked(&self, domain: &str) -> bool {
        sqlx::query_scalar("SELECT count(id) > 0 FROM blocked_domains WHERE domain = ?")
            .bind(domain)
            .fetch_one(&self.database)
            .await
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    async fn import(&self) -> Result<(u64, u64), sqlx::Error> {
        let mut tx = self.database.begin().await?;

        let mut total_inserted = 0;
        let mut total_deleted = 0;

        let loader = redoubt_blocklist_loader::BlocklistLoader;
        for (name, item) in self.items.iter() {
            tracing::debug!("start loading {name:?}");
            match loader.load(&item.url, item.kind).await {
                Ok(result) => {
                    tracing::debug!(
                        "loaded blocklist {name:?} with {} domains and hash {}",
                        result.entries.len(),
                        result.hash
                    );
                    let description = format!("{name} blocklist of {:?} kind", item.kind);
                    let (inserted, deleted) =
                        import_list(&mut tx, &item.url, &description, &result.hash, result.entries)
                            .await?;
                    tracing::debug!("blocklist {name:?} inserted {inserted} new domains and deleted {deleted} existing domains");
                    total_inserted += inserted;
                    total_deleted += deleted;
                }
                Err(error) => tracing::warn!("unable to load blocklist {name:?}: {error:?}"),
            };
        }

        tx.commit().await?;
        Ok((total_inserted, total_deleted))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlocklistService {
    inner: std::sync::RwLock<HashSet<String>>,
}

impl MemoryBlocklistService {
    pub fn with_domain<D: Into<String>>(self, domain: D) -> Self {
        self.inner.write().unwrap().insert(domain.into());
        self
    }
}

#[async_trait::async_trait]
impl BlocklistService for MemoryBlocklistService {
    async fn is_blocked(&self, domain: &str) -> bool {
        self.inner.read().unwrap().contains(domain)
    }

    async fn import(&self) -> Result<(u64, u64), sqlx::Error> {
        Ok((0, 0))
    }
}
