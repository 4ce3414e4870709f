//! SQLite-backed repository with a cache-aside read path.
//!
//! Split into focused submodules:
//! - `unit`: the unit of work and every CRUD operation
//! - `sql`: value binding, row decoding and error mapping

mod sql;
mod unit;

pub use unit::UnitOfWork;

use crate::cache::CacheBackend;
use crate::keys::Filters;
use progressor_core::{
    config::StorageConfig,
    entity::{EntityKind, Record, RecordId},
    error::ProgressorError,
    shellexpand,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::info;

/// Persistent entity storage backed by SQLite, fronted by a cache.
///
/// Each method below runs in its own unit of work: it commits when the
/// operation succeeds and rolls back when it fails. Use
/// [`transaction`](Self::transaction) to group several operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    cache: Arc<dyn CacheBackend>,
    /// Bumped by every unit that commits a write.
    commits: Arc<AtomicU64>,
}

impl Repository {
    /// Open the database at `config.db_path`, running migrations on first use.
    pub async fn new(
        config: &StorageConfig,
        cache: Arc<dyn CacheBackend>,
    ) -> Result<Self, ProgressorError> {
        let db_path = shellexpand(&config.db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProgressorError::Storage(format!("failed to create data dir: {e}"))
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| ProgressorError::Storage(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(opts)
            .await
            .map_err(|e| ProgressorError::Storage(format!("failed to connect to sqlite: {e}")))?;

        let repo = Self::from_pool(pool, cache).await?;
        info!(
            "Repository initialized at {db_path} (cache: {})",
            repo.cache.name()
        );
        Ok(repo)
    }

    /// A private in-memory database. Everything is lost when the repository
    /// is dropped.
    pub async fn in_memory(cache: Arc<dyn CacheBackend>) -> Result<Self, ProgressorError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ProgressorError::Storage(format!("invalid db path: {e}")))?
            .foreign_keys(true);

        // Each in-memory connection is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| ProgressorError::Storage(format!("failed to open sqlite: {e}")))?;

        Self::from_pool(pool, cache).await
    }

    /// Wrap an existing pool and bring its schema up to date.
    pub async fn from_pool(
        pool: SqlitePool,
        cache: Arc<dyn CacheBackend>,
    ) -> Result<Self, ProgressorError> {
        Self::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            cache,
            commits: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), ProgressorError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| ProgressorError::Storage(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] =
            &[("001_init", include_str!("../../migrations/001_init.sql"))];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        ProgressorError::Storage(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| ProgressorError::Storage(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    ProgressorError::Storage(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }

    /// Open a unit of work.
    pub async fn transaction(&self) -> Result<UnitOfWork, ProgressorError> {
        UnitOfWork::begin(&self.pool, self.cache.clone(), self.commits.clone()).await
    }

    /// Insert a row and return it as stored, generated key included.
    pub async fn create(&self, kind: EntityKind, fields: Record) -> Result<Record, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.create(kind, fields).await;
        uow.finish(result).await
    }

    pub async fn get_by_id(
        &self,
        kind: EntityKind,
        id: impl Into<RecordId>,
    ) -> Result<Option<Record>, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.get_by_id(kind, id).await;
        uow.finish(result).await
    }

    /// First row (by primary key) whose `field` equals `value`.
    pub async fn get_by_custom_field(
        &self,
        kind: EntityKind,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Record>, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.get_by_custom_field(kind, field, value).await;
        uow.finish(result).await
    }

    /// Rows matching every filter, in primary-key order.
    pub async fn get_by_custom_fields(
        &self,
        kind: EntityKind,
        filters: &Filters,
    ) -> Result<Vec<Record>, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.get_by_custom_fields(kind, filters).await;
        uow.finish(result).await
    }

    /// Apply `fields` to the row with `id`. Returns `false` if no such row.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: impl Into<RecordId>,
        fields: Record,
    ) -> Result<bool, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.update(kind, id, fields).await;
        uow.finish(result).await
    }

    /// Delete the row with `id`. Returns `false` if no such row.
    pub async fn delete(
        &self,
        kind: EntityKind,
        id: impl Into<RecordId>,
    ) -> Result<bool, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.delete(kind, id).await;
        uow.finish(result).await
    }

    pub async fn get_all(&self, kind: EntityKind) -> Result<Vec<Record>, ProgressorError> {
        let mut uow = self.transaction().await?;
        let result = uow.get_all(kind).await;
        uow.finish(result).await
    }
}
