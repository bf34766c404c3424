pub type Pool = sqlx::sqlite::SqlitePool;
pub type Transaction<'t> = sqlx::Transaction<'t, sqlx::Sqlite>;
pub type Error = sqlx::Error;

/// Creates the blocklist tables if they don't exist yet. Small enough
/// that a single ad-hoc statement beats pulling in a migration runner
/// for two tables.
pub async fn migrate(pool: &Pool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS blocklists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_refresh_at INTEGER NOT NULL,
            last_refresh_hash TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS blocked_domains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            blocklist_id INTEGER NOT NULL REFERENCES blocklists(id),
            domain TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (blocklist_id, domain)
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_url")]
    url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
        }
    }
}

impl Config {
    fn default_url() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| String::from("sqlite::memory:"))
    }

    pub fn from_env() -> Self {
        Self {
            url: Self::default_url(),
        }
    }

    pub async fn build(self) -> Result<Pool, sqlx::Error> {
        sqlx::sqlite::SqlitePoolOptions::new()
            .connect(&self.url)
            .await
    }
}
