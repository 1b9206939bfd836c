//! SQLite store using sqlx.
//!
//! Process-wide tables:
//!
//! ```sql
//! slot_resources (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT UNIQUE)
//! slot_locks     (name TEXT PRIMARY KEY, active INTEGER)
//! slot_usages    (resource_id, kind, key, count, PRIMARY KEY (resource_id, kind, key))
//! ```
//!
//! Per kind, named from [`KindTables`]:
//!
//! ```sql
//! <p>_entities   (id, cid UNIQUE, created_at, updated_at, t_0, v_0, .., t_{N-1}, v_{N-1})
//! <p>_extras     (entity_id, name, value BLOB, PRIMARY KEY (entity_id, name))
//! <p>_attributes (col UNIQUE, name UNIQUE)
//! ```

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::backend::{
    AttributeColumnMap, EntityRows, LockTable, OverflowRows, ResourceTable, Schema, Store,
    UsageTable,
};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    AttributeRecord, EntityRecord, KindTables, OverflowRecord, ResourceRecord, Slot, SlotWrite,
    UsageRecord,
};
use crate::query::{Column, Condition, Operand, Predicate, Query};

/// Default maximum connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Columns preceding the slot pairs in a wide row.
const FIXED_COLUMNS: usize = 4;

/// A store backed by a SQLite database.
///
/// Several processes may open the same file; WAL mode lets readers proceed
/// while one writer holds the database, and busy errors surface as
/// retryable [`StorageError::Busy`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Connect to a SQLite database.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g., `sqlite:data/slot.db`
    ///
    /// # Configuration
    ///
    /// - WAL journal mode for better concurrency
    /// - Normal synchronous mode for performance with durability
    /// - Create database if not exists
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the database cannot be
    /// opened.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?;
        Self::connect_with(options).await
    }

    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> StorageResult<Self> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn column_sql(column: Column) -> String {
    match column {
        Column::Slot(col) => format!("v_{col}"),
        Column::Cid => "cid".to_string(),
        Column::Num => "id".to_string(),
        Column::UpdatedAt => "updated_at".to_string(),
    }
}

fn select_list(tables: &KindTables) -> String {
    let mut list = String::from("id, cid, created_at, updated_at");
    for col in 0..tables.columns() {
        let _ = write!(list, ", t_{col}, v_{col}");
    }
    list
}

fn record_from_row(row: &SqliteRow, columns: u32) -> StorageResult<EntityRecord> {
    let mut slots = Vec::with_capacity(columns as usize);
    for col in 0..columns as usize {
        let tag: Option<i64> = row.try_get(FIXED_COLUMNS + 2 * col)?;
        let text: Option<String> = row.try_get(FIXED_COLUMNS + 2 * col + 1)?;
        let slot = match tag {
            Some(tag) => {
                let tag = u8::try_from(tag)
                    .map_err(|_| StorageError::Corrupted(format!("type tag {tag} in t_{col}")))?;
                Some(Slot::new(tag, text))
            }
            None => None,
        };
        slots.push(slot);
    }
    Ok(EntityRecord {
        id: row.try_get(0)?,
        cid: row.try_get(1)?,
        created_at: row.try_get(2)?,
        updated_at: row.try_get(3)?,
        slots,
    })
}

fn check_columns(tables: &KindTables, slots: &[SlotWrite]) -> StorageResult<()> {
    match slots.iter().find(|w| w.col >= tables.columns()) {
        Some(w) => Err(StorageError::Corrupted(format!(
            "column {} out of range",
            w.col
        ))),
        None => Ok(()),
    }
}

fn slot_binds(write: &SlotWrite) -> (Option<i64>, Option<String>) {
    match &write.slot {
        Some(slot) => (Some(i64::from(slot.tag)), slot.text.clone()),
        None => (None, None),
    }
}

fn push_operand(qb: &mut QueryBuilder<'_, Sqlite>, operand: &Operand) {
    match operand {
        Operand::Text(s) => {
            qb.push_bind(s.clone());
        }
        Operand::Int(n) => {
            qb.push_bind(*n);
        }
    }
}

fn push_list(qb: &mut QueryBuilder<'_, Sqlite>, list: &[Operand]) {
    qb.push("(");
    for (i, operand) in list.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_operand(qb, operand);
    }
    qb.push(")");
}

fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    match predicate {
        Predicate::All => {
            qb.push("1 = 1");
        }
        Predicate::Nothing => {
            qb.push("1 = 0");
        }
        Predicate::And(parts) | Predicate::Or(parts) => {
            let is_and = matches!(predicate, Predicate::And(_));
            if parts.is_empty() {
                qb.push(if is_and { "1 = 1" } else { "1 = 0" });
                return;
            }
            qb.push("(");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    qb.push(if is_and { " AND " } else { " OR " });
                }
                push_predicate(qb, part);
            }
            qb.push(")");
        }
        Predicate::Cond { column, condition } => push_condition(qb, *column, condition),
    }
}

fn push_binary(qb: &mut QueryBuilder<'_, Sqlite>, col: &str, op: &str, operand: &Operand) {
    qb.push(format!("{col} {op} "));
    push_operand(qb, operand);
}

fn push_condition(qb: &mut QueryBuilder<'_, Sqlite>, column: Column, condition: &Condition) {
    let col = column_sql(column);
    match condition {
        Condition::Eq(x) => push_binary(qb, &col, "=", x),
        Condition::Ne(x) => push_binary(qb, &col, "<>", x),
        Condition::Gt(x) => push_binary(qb, &col, ">", x),
        Condition::Gte(x) => push_binary(qb, &col, ">=", x),
        Condition::Lt(x) => push_binary(qb, &col, "<", x),
        Condition::Lte(x) => push_binary(qb, &col, "<=", x),
        Condition::In(list) if list.is_empty() => {
            qb.push("1 = 0");
        }
        Condition::NotIn(list) if list.is_empty() => {
            qb.push("1 = 1");
        }
        Condition::In(list) => {
            qb.push(format!("{col} IN "));
            push_list(qb, list);
        }
        Condition::NotIn(list) => {
            qb.push(format!("{col} NOT IN "));
            push_list(qb, list);
        }
        Condition::Between(lo, hi) | Condition::NotBetween(lo, hi) => {
            let not = if matches!(condition, Condition::NotBetween(..)) {
                "NOT "
            } else {
                ""
            };
            qb.push(format!("{col} {not}BETWEEN "));
            push_operand(qb, lo);
            qb.push(" AND ");
            push_operand(qb, hi);
        }
        Condition::Like(pattern) => {
            qb.push(format!("{col} LIKE "));
            qb.push_bind(pattern.clone());
        }
        Condition::NotLike(pattern) => {
            qb.push(format!("{col} NOT LIKE "));
            qb.push_bind(pattern.clone());
        }
        Condition::IsNull => {
            qb.push(format!("{col} IS NULL"));
        }
        Condition::NotNull => {
            qb.push(format!("{col} IS NOT NULL"));
        }
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl Schema for SqliteStore {
    async fn ensure_base_schema(&self) -> StorageResult<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS slot_resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
            "CREATE TABLE IF NOT EXISTS slot_locks (
                name TEXT PRIMARY KEY,
                active INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS slot_usages (
                resource_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (resource_id, kind, key)
            )",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn ensure_kind_schema(&self, tables: &KindTables) -> StorageResult<()> {
        let mut entities = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cid TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL",
            tables.entities()
        );
        for col in 0..tables.columns() {
            let _ = write!(entities, ",\n                t_{col} INTEGER, v_{col} TEXT");
        }
        entities.push(')');

        let extras = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                entity_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value BLOB,
                PRIMARY KEY (entity_id, name)
            )",
            tables.extras()
        );
        let attributes = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                col INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL UNIQUE
            )",
            tables.attributes()
        );

        let mut tx = self.pool.begin().await?;
        for sql in [entities, extras, attributes] {
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("ensured tables for {}", tables.prefix());
        Ok(())
    }

    async fn ensure_indexes(&self, tables: &KindTables, columns: &[Column]) -> StorageResult<()> {
        for column in columns {
            let name = match column {
                Column::Slot(col) => format!("{}_idx_v_{col}", tables.prefix()),
                Column::UpdatedAt => format!("{}_idx_updated_at", tables.prefix()),
                // unique and primary key columns are indexed already
                Column::Cid | Column::Num => continue,
            };
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS \"{name}\" ON \"{}\" ({})",
                tables.entities(),
                column_sql(*column)
            );
            sqlx::query(&sql).execute(&self.pool).await?;
            debug!("ensured index {name}");
        }
        Ok(())
    }

    async fn drop_kind_schema(&self, tables: &KindTables) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for table in [tables.extras(), tables.entities(), tables.attributes()] {
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("dropped tables for {}", tables.prefix());
        Ok(())
    }
}

#[async_trait]
impl ResourceTable for SqliteStore {
    async fn find_resource(&self, name: &str) -> StorageResult<Option<ResourceRecord>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM slot_resources WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| ResourceRecord { id, name }))
    }

    async fn find_or_create_resource(&self, name: &str) -> StorageResult<ResourceRecord> {
        sqlx::query("INSERT INTO slot_resources (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        self.find_resource(name)
            .await?
            .ok_or_else(|| StorageError::Corrupted(format!("resource {name} vanished")))
    }

    async fn all_resources(&self) -> StorageResult<Vec<ResourceRecord>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM slot_resources ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ResourceRecord { id, name })
            .collect())
    }

    async fn delete_resource(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM slot_resources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AttributeColumnMap for SqliteStore {
    async fn attributes(&self, tables: &KindTables) -> StorageResult<Vec<AttributeRecord>> {
        let sql = format!(
            "SELECT col, name FROM \"{}\" ORDER BY col",
            tables.attributes()
        );
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(col, name)| {
                let col = u32::try_from(col)
                    .map_err(|_| StorageError::Corrupted(format!("column {col} for {name}")))?;
                Ok(AttributeRecord { name, col })
            })
            .collect()
    }

    async fn insert_attributes(
        &self,
        tables: &KindTables,
        records: &[AttributeRecord],
    ) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO \"{}\" (col, name) ",
            tables.attributes()
        ));
        qb.push_values(records, |mut row, record| {
            row.push_bind(i64::from(record.col))
                .push_bind(record.name.clone());
        });
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EntityRows for SqliteStore {
    async fn insert_entity(
        &self,
        tables: &KindTables,
        cid: &str,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<i64> {
        check_columns(tables, slots)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO \"{}\" (cid, created_at, updated_at",
            tables.entities()
        ));
        for write in slots {
            qb.push(format!(", t_{col}, v_{col}", col = write.col));
        }
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            values.push_bind(cid.to_string());
            values.push_bind(now);
            values.push_bind(now);
            for write in slots {
                let (tag, text) = slot_binds(write);
                values.push_bind(tag);
                values.push_bind(text);
            }
        }
        qb.push(")");
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_entity(
        &self,
        tables: &KindTables,
        id: i64,
        now: i64,
        slots: &[SlotWrite],
    ) -> StorageResult<bool> {
        check_columns(tables, slots)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE \"{}\" SET updated_at = ",
            tables.entities()
        ));
        qb.push_bind(now);
        for write in slots {
            let (tag, text) = slot_binds(write);
            qb.push(format!(", t_{} = ", write.col));
            qb.push_bind(tag);
            qb.push(format!(", v_{} = ", write.col));
            qb.push_bind(text);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_entity(
        &self,
        tables: &KindTables,
        cid: &str,
    ) -> StorageResult<Option<EntityRecord>> {
        let sql = format!(
            "SELECT {} FROM \"{}\" WHERE cid = ?",
            select_list(tables),
            tables.entities()
        );
        let row = sqlx::query(&sql)
            .bind(cid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| record_from_row(&row, tables.columns()))
            .transpose()
    }

    async fn select_entities(
        &self,
        tables: &KindTables,
        query: &Query,
    ) -> StorageResult<Vec<EntityRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM \"{}\" WHERE ",
            select_list(tables),
            tables.entities()
        ));
        push_predicate(&mut qb, &query.predicate);
        if !query.sort.is_empty() {
            qb.push(" ORDER BY ");
            for (i, key) in query.sort.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                let direction = if key.descending { "DESC" } else { "ASC" };
                qb.push(format!("{} {direction}", column_sql(key.column)));
            }
        }
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        qb.push(" LIMIT ");
        qb.push_bind(query.limit.map_or(-1, to_i64));
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(query.offset));

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| record_from_row(row, tables.columns()))
            .collect()
    }

    async fn count_entities(
        &self,
        tables: &KindTables,
        predicate: &Predicate,
    ) -> StorageResult<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE ",
            tables.entities()
        ));
        push_predicate(&mut qb, predicate);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_entity(&self, tables: &KindTables, cid: &str) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;
        let select = format!("SELECT id FROM \"{}\" WHERE cid = ?", tables.entities());
        let id: Option<i64> = sqlx::query_scalar(&select)
            .bind(cid)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(id) = id else {
            return Ok(0);
        };
        let extras = format!("DELETE FROM \"{}\" WHERE entity_id = ?", tables.extras());
        sqlx::query(&extras).bind(id).execute(&mut *tx).await?;
        let entities = format!("DELETE FROM \"{}\" WHERE id = ?", tables.entities());
        let result = sqlx::query(&entities).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_entities(&self, tables: &KindTables) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM \"{}\"", tables.extras()))
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(&format!("DELETE FROM \"{}\"", tables.entities()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OverflowRows for SqliteStore {
    async fn overflow_of(
        &self,
        tables: &KindTables,
        entity_ids: &[i64],
    ) -> StorageResult<Vec<(i64, OverflowRecord)>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT entity_id, name, value FROM \"{}\" WHERE entity_id IN (",
            tables.extras()
        ));
        {
            let mut ids = qb.separated(", ");
            for id in entity_ids {
                ids.push_bind(*id);
            }
        }
        qb.push(") ORDER BY entity_id, name");
        let rows: Vec<(i64, String, Option<Vec<u8>>)> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, value)| (id, OverflowRecord { name, value }))
            .collect())
    }

    async fn upsert_overflow(
        &self,
        tables: &KindTables,
        entity_id: i64,
        records: &[OverflowRecord],
    ) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO \"{}\" (entity_id, name, value) VALUES (?, ?, ?)
             ON CONFLICT (entity_id, name) DO UPDATE SET value = excluded.value",
            tables.extras()
        );
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&sql)
                .bind(entity_id)
                .bind(&record.name)
                .bind(&record.value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LockTable for SqliteStore {
    async fn try_lock(&self, name: &str) -> StorageResult<bool> {
        sqlx::query("INSERT INTO slot_locks (name, active) VALUES (?, 0) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("UPDATE slot_locks SET active = 1 WHERE name = ? AND active = 0")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, name: &str) -> StorageResult<()> {
        sqlx::query("UPDATE slot_locks SET active = 0 WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_locked(&self, name: &str) -> StorageResult<bool> {
        let active: Option<i64> = sqlx::query_scalar("SELECT active FROM slot_locks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(active == Some(1))
    }

    async fn unlock_all(&self) -> StorageResult<u64> {
        let result = sqlx::query("UPDATE slot_locks SET active = 0 WHERE active = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UsageTable for SqliteStore {
    async fn add_usage(&self, resource_id: i64, records: &[UsageRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO slot_usages (resource_id, kind, key, count) VALUES (?, ?, ?, ?)
                 ON CONFLICT (resource_id, kind, key) DO UPDATE SET count = count + excluded.count",
            )
            .bind(resource_id)
            .bind(&record.kind)
            .bind(&record.key)
            .bind(record.count)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn usage_of(&self, resource_id: i64) -> StorageResult<Vec<UsageRecord>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT kind, key, count FROM slot_usages WHERE resource_id = ? ORDER BY kind, key",
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(kind, key, count)| UsageRecord { kind, key, count })
            .collect())
    }

    async fn clear_usage(&self, resource_id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM slot_usages WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
