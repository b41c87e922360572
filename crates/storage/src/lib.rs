use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::{fs, path::Path, sync::Arc};
mod memory;
mod models;
mod repo;
mod store;
mod subscription;

pub use memory::MemoryStore;
pub use store::{DocumentStore, Query};
pub use subscription::Subscription;

use store::{Clock, Feed};

#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) feed: Feed,
    pub(crate) clock: Arc<Clock>,
}

impl Db {
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        let in_memory = db_url.contains(":memory:");
        if db_url.starts_with("sqlite://") && !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://");
            let path = Path::new(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url).await?;
        }
        // every connection to :memory: opens a fresh database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        if !in_memory {
            sqlx::query("PRAGMA journal_mode = WAL;")
                .execute(&pool)
                .await?;
        }
        sqlx::query("PRAGMA synchronous = NORMAL;")
            .execute(&pool)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;

        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM documents")
            .fetch_one(&pool)
            .await?;
        tracing::info!("Document store ready at {}", db_url);

        Ok(Self {
            pool,
            feed: Feed::new(),
            clock: Arc::new(Clock::starting_after(last.unwrap_or(0))),
        })
    }
}
