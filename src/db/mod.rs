pub mod repository;

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::error::AppResult;
use crate::models::Item;

/// Durable CRUD over the `to_do_items` table.
///
/// Implementations surface failures as-is; nothing here retries.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_all(&self) -> AppResult<Vec<Item>>;
    async fn get_by_id(&self, id: &str) -> AppResult<Option<Item>>;
    async fn upsert(&self, item: &Item) -> AppResult<()>;
    async fn update(&self, item: &Item) -> AppResult<u64>;
    async fn set_completed(&self, id: &str, completed: bool) -> AppResult<()>;
    async fn delete_by_id(&self, id: &str) -> AppResult<u64>;
    async fn delete_all(&self) -> AppResult<()>;
    async fn delete_completed(&self) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct SqliteItemStore {
    db: SqlitePool,
}

impl SqliteItemStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn list_all(&self) -> AppResult<Vec<Item>> {
        Ok(repository::fetch_items(&self.db).await?)
    }

    async fn get_by_id(&self, id: &str) -> AppResult<Option<Item>> {
        Ok(repository::find_item_by_id(&self.db, id).await?)
    }

    async fn upsert(&self, item: &Item) -> AppResult<()> {
        Ok(repository::upsert_item(&self.db, item).await?)
    }

    async fn update(&self, item: &Item) -> AppResult<u64> {
        Ok(repository::update_item(&self.db, item).await?)
    }

    async fn set_completed(&self, id: &str, completed: bool) -> AppResult<()> {
        Ok(repository::update_completed(&self.db, id, completed).await?)
    }

    async fn delete_by_id(&self, id: &str) -> AppResult<u64> {
        let removed = repository::delete_item_by_id(&self.db, id).await?;
        debug!("deleted {} row(s) for item {}", removed, id);
        Ok(removed)
    }

    async fn delete_all(&self) -> AppResult<()> {
        Ok(repository::delete_items(&self.db).await?)
    }

    async fn delete_completed(&self) -> AppResult<u64> {
        let removed = repository::delete_completed_items(&self.db).await?;
        debug!("deleted {} completed item(s)", removed);
        Ok(removed)
    }
}

/// Opens the pool for `database_url`, creating the database file if needed,
/// and applies the embedded migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database; every connection to `sqlite::memory:`
/// is a separate database, so the pool must never open a second one.
pub async fn connect_in_memory() -> AppResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
