//! Unit of work: one database transaction plus the cache entries it staled.

use super::sql::{self, storage_err};
use crate::cache::CacheBackend;
use crate::keys::{self, Filters, Stale};
use progressor_core::{
    entity::{Column, EntityKind, Record, RecordId},
    error::{ProgressorError, ValidationError},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A group of repository operations that commit or roll back together.
///
/// Cache entries made stale by a write are dropped as soon as the write
/// runs and again after commit. Once the unit has written, its reads skip
/// the cache entirely so uncommitted rows are never cached.
///
/// The transaction reads from one snapshot for its whole life, so once any
/// other unit commits a write, rows read here may already be outdated and
/// are no longer copied into the cache.
///
/// Dropping a unit without calling [`commit`](Self::commit) rolls it back.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    cache: Arc<dyn CacheBackend>,
    dirty: bool,
    stale: Vec<Stale>,
    commits: Arc<AtomicU64>,
    commits_at_begin: u64,
}

impl UnitOfWork {
    pub(crate) async fn begin(
        pool: &SqlitePool,
        cache: Arc<dyn CacheBackend>,
        commits: Arc<AtomicU64>,
    ) -> Result<Self, ProgressorError> {
        let commits_at_begin = commits.load(Ordering::SeqCst);
        let tx = pool
            .begin()
            .await
            .map_err(|e| storage_err("failed to begin transaction", e))?;
        Ok(Self {
            tx,
            cache,
            dirty: false,
            stale: Vec::new(),
            commits,
            commits_at_begin,
        })
    }

    /// Whether this unit has written anything yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub async fn commit(self) -> Result<(), ProgressorError> {
        let Self {
            tx,
            cache,
            stale,
            commits,
            ..
        } = self;
        tx.commit()
            .await
            .map_err(|e| storage_err("commit failed", e))?;
        if !stale.is_empty() {
            commits.fetch_add(1, Ordering::SeqCst);
        }
        for entry in &stale {
            evict(cache.as_ref(), entry).await?;
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ProgressorError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| storage_err("rollback failed", e))
    }

    /// Commit if `result` is `Ok`, roll back otherwise, and pass it through.
    pub async fn finish<T>(
        self,
        result: Result<T, ProgressorError>,
    ) -> Result<T, ProgressorError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.rollback().await {
                    warn!("{rb}");
                }
                Err(e)
            }
        }
    }

    pub async fn create(
        &mut self,
        kind: EntityKind,
        fields: Record,
    ) -> Result<Record, ProgressorError> {
        let mut names = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for (name, value) in &fields {
            let column = kind.require_column(name)?;
            values.push(column.coerce(value)?);
            names.push(column.name);
        }

        let stmt = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", kind.table())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                kind.table(),
                names.join(", "),
                vec!["?"; names.len()].join(", ")
            )
        };
        let mut query = sqlx::query(&stmt);
        for value in &values {
            query = sql::bind(query, value);
        }
        let row = query
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to create {kind}"), e))?;
        let record = sql::decode(kind, &row)?;

        self.written(Stale::after_write(kind, None, false)).await?;
        if let Some(id) = RecordId::of(kind, &record) {
            debug!("created {kind} {id}");
        }
        Ok(record)
    }

    pub async fn get_by_id(
        &mut self,
        kind: EntityKind,
        id: impl Into<RecordId>,
    ) -> Result<Option<Record>, ProgressorError> {
        let id = id.into();
        let key = keys::by_id(kind, &id);
        if let Some(hit) = cached(self.cache.as_ref(), self.dirty, &key).await? {
            return Ok(Some(hit));
        }

        let pk = kind.primary_key();
        let id_value = pk.coerce(&id.to_value())?;
        let stmt = format!("SELECT * FROM {} WHERE {} = ?", kind.table(), pk.name);
        let row = sql::bind(sqlx::query(&stmt), &id_value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to read {kind} {id}"), e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = sql::decode(kind, &row)?;
        populate(self.cache.as_ref(), self.snapshot_is_current(), &key, &record).await?;
        Ok(Some(record))
    }

    pub async fn get_by_custom_field(
        &mut self,
        kind: EntityKind,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Record>, ProgressorError> {
        let column = kind.require_column(field)?;
        let value = column.coerce(&value.into())?;
        let key = keys::by_field(kind, column.name, &value);
        if let Some(hit) = cached(self.cache.as_ref(), self.dirty, &key).await? {
            return Ok(Some(hit));
        }

        let stmt = format!(
            "SELECT * FROM {} WHERE {} IS ? ORDER BY {} LIMIT 1",
            kind.table(),
            column.name,
            kind.primary_key().name
        );
        let row = sql::bind(sqlx::query(&stmt), &value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to query {kind}"), e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record = sql::decode(kind, &row)?;
        populate(self.cache.as_ref(), self.snapshot_is_current(), &key, &record).await?;
        Ok(Some(record))
    }

    pub async fn get_by_custom_fields(
        &mut self,
        kind: EntityKind,
        filters: &Filters,
    ) -> Result<Vec<Record>, ProgressorError> {
        let mut normalized = Filters::new();
        let mut clauses = Vec::with_capacity(filters.len());
        let mut values = Vec::with_capacity(filters.len());
        for (field, value) in filters.iter() {
            let column = kind.require_column(field)?;
            let value = column.coerce(value)?;
            clauses.push(format!("{} IS ?", column.name));
            values.push(value.clone());
            normalized = normalized.eq(column.name, value);
        }

        let key = keys::by_fields(kind, &normalized);
        if let Some(hit) = cached(self.cache.as_ref(), self.dirty, &key).await? {
            return Ok(hit);
        }

        let mut stmt = format!("SELECT * FROM {}", kind.table());
        if !clauses.is_empty() {
            stmt.push_str(" WHERE ");
            stmt.push_str(&clauses.join(" AND "));
        }
        stmt.push_str(&format!(" ORDER BY {}", kind.primary_key().name));

        let records = self.select(kind, &stmt, &values).await?;
        populate(self.cache.as_ref(), self.snapshot_is_current(), &key, &records).await?;
        Ok(records)
    }

    pub async fn update(
        &mut self,
        kind: EntityKind,
        id: impl Into<RecordId>,
        fields: Record,
    ) -> Result<bool, ProgressorError> {
        let id = id.into();
        let pk = kind.primary_key();
        let id_value = pk.coerce(&id.to_value())?;
        if !self.exists(kind, &id_value).await? {
            return Ok(false);
        }

        let mut changes: Vec<(&'static Column, Value)> = Vec::with_capacity(fields.len());
        for (name, value) in &fields {
            match kind.column(name) {
                Some(column) if !column.primary_key => {
                    changes.push((column, column.coerce(value)?));
                }
                Some(_) => debug!("update {kind} {id}: key '{name}' is immutable, ignoring"),
                None => debug!("update {kind} {id}: unknown field '{name}', ignoring"),
            }
        }
        if changes.is_empty() {
            return Ok(true);
        }

        if kind == EntityKind::Task {
            let new_parent = changes
                .iter()
                .find(|(c, _)| c.name == "parent_id")
                .and_then(|(_, v)| v.as_i64());
            if let (Some(parent), Some(task_id)) = (new_parent, id_value.as_i64()) {
                self.ensure_outside_subtree(task_id, parent).await?;
            }
        }

        let assignments: Vec<String> = changes
            .iter()
            .map(|(c, _)| format!("{} = ?", c.name))
            .collect();
        let stmt = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            kind.table(),
            assignments.join(", "),
            pk.name
        );
        let mut query = sqlx::query(&stmt);
        for (_, value) in &changes {
            query = sql::bind(query, value);
        }
        query = sql::bind(query, &id_value);
        query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to update {kind} {id}"), e))?;

        self.written(Stale::after_write(kind, Some(&id), false))
            .await?;
        // user_state rows are keyed by the user's telegram handle and follow it.
        if kind == EntityKind::User && changes.iter().any(|(c, _)| c.name == "telegram_username")
        {
            self.written(Stale::after_write(EntityKind::UserState, None, true))
                .await?;
        }
        debug!("updated {kind} {id}");
        Ok(true)
    }

    pub async fn delete(
        &mut self,
        kind: EntityKind,
        id: impl Into<RecordId>,
    ) -> Result<bool, ProgressorError> {
        let id = id.into();
        let pk = kind.primary_key();
        let id_value = pk.coerce(&id.to_value())?;
        let stmt = format!("DELETE FROM {} WHERE {} = ?", kind.table(), pk.name);
        let result = sql::bind(sqlx::query(&stmt), &id_value)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to delete {kind} {id}"), e))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.written(Stale::after_write(kind, Some(&id), false))
            .await?;
        for &cascaded in kind.cascades_to() {
            self.written(Stale::after_write(cascaded, None, true))
                .await?;
        }
        debug!("deleted {kind} {id}");
        Ok(true)
    }

    pub async fn get_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, ProgressorError> {
        let key = keys::all(kind);
        if let Some(hit) = cached(self.cache.as_ref(), self.dirty, &key).await? {
            return Ok(hit);
        }
        let stmt = format!(
            "SELECT * FROM {} ORDER BY {}",
            kind.table(),
            kind.primary_key().name
        );
        let records = self.select(kind, &stmt, &[]).await?;
        populate(self.cache.as_ref(), self.snapshot_is_current(), &key, &records).await?;
        Ok(records)
    }

    async fn select(
        &mut self,
        kind: EntityKind,
        stmt: &str,
        values: &[Value],
    ) -> Result<Vec<Record>, ProgressorError> {
        let mut query = sqlx::query(stmt);
        for value in values {
            query = sql::bind(query, value);
        }
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to query {kind}"), e))?;
        rows.iter().map(|row| sql::decode(kind, row)).collect()
    }

    async fn exists(&mut self, kind: EntityKind, id_value: &Value) -> Result<bool, ProgressorError> {
        let stmt = format!(
            "SELECT 1 FROM {} WHERE {} = ?",
            kind.table(),
            kind.primary_key().name
        );
        let row = sql::bind(sqlx::query(&stmt), id_value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| storage_err(&format!("failed to look up {kind}"), e))?;
        Ok(row.is_some())
    }

    /// Reject moving `task_id` under `new_parent` when `new_parent` is the
    /// task itself or one of its descendants.
    async fn ensure_outside_subtree(
        &mut self,
        task_id: i64,
        new_parent: i64,
    ) -> Result<(), ProgressorError> {
        let mut seen = HashSet::new();
        let mut current = Some(new_parent);
        while let Some(id) = current {
            if id == task_id {
                return Err(ValidationError::new(
                    "parent_id",
                    format!("task {task_id} cannot be nested under itself or its subtasks"),
                )
                .into());
            }
            if !seen.insert(id) {
                break;
            }
            current = sqlx::query_scalar::<_, Option<i64>>("SELECT parent_id FROM tasks WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| storage_err("failed to walk task ancestry", e))?
                .flatten();
        }
        Ok(())
    }

    /// Whether rows read here can still be cached: nothing written by this
    /// unit, and no other unit has committed a write since this one began.
    fn snapshot_is_current(&self) -> bool {
        !self.dirty && self.commits.load(Ordering::SeqCst) == self.commits_at_begin
    }

    async fn written(&mut self, stale: Stale) -> Result<(), ProgressorError> {
        self.dirty = true;
        evict(self.cache.as_ref(), &stale).await?;
        self.stale.push(stale);
        Ok(())
    }
}

async fn evict(cache: &dyn CacheBackend, stale: &Stale) -> Result<(), ProgressorError> {
    let mut doomed = stale.exact.clone();
    for pattern in &stale.patterns {
        doomed.extend(cache.keys(pattern).await?);
    }
    let removed = cache.delete(&doomed).await?;
    if removed > 0 {
        debug!("evicted {removed} cache entries");
    }
    Ok(())
}

/// Cached value for `key`, unless the unit has already written.
async fn cached<T: DeserializeOwned>(
    cache: &dyn CacheBackend,
    dirty: bool,
    key: &str,
) -> Result<Option<T>, ProgressorError> {
    if dirty {
        return Ok(None);
    }
    let Some(raw) = cache.get(key).await? else {
        debug!("cache miss: {key}");
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => {
            debug!("cache hit: {key}");
            Ok(Some(value))
        }
        Err(e) => {
            warn!("dropping unreadable cache entry {key}: {e}");
            cache.delete(&[key.to_string()]).await?;
            Ok(None)
        }
    }
}

async fn populate<T: Serialize>(
    cache: &dyn CacheBackend,
    current: bool,
    key: &str,
    value: &T,
) -> Result<(), ProgressorError> {
    if !current {
        debug!("not caching {key}");
        return Ok(());
    }
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw).await
}
