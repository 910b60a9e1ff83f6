//! Durable mapping store.
//!
//! One row per intended mirror pair, plus named cursors. Backed by SQLite;
//! the schema is created on open and migration is idempotent. The engine
//! groups its mutations into one transaction per execution phase so that an
//! interrupted tick leaves only committed checkpoints behind.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

use crate::error::{BridgeCalError, BridgeCalResult};
use crate::event::Origin;
use crate::fingerprint;

/// Cursor name for Google's incremental listing token.
pub const CURSOR_GOOGLE_SYNC_TOKEN: &str = "google_sync_token";
/// Cursor name for the last Outlook scan time (operator diagnostics only).
pub const CURSOR_LAST_OUTLOOK_SCAN_AT: &str = "last_outlook_scan_at";

const PAIR_COLUMNS: &str = "outlook_id, google_id, origin, \
     last_outlook_modified, last_google_modified, \
     last_outlook_fingerprint, last_google_fingerprint, \
     created_at, updated_at";

/// One intended mirror pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairRow {
    pub outlook_id: String,
    pub google_id: String,
    /// Which side was authoritative at creation; used for tie-breaks, never
    /// rewritten by conflicts.
    pub origin: Origin,
    pub last_outlook_modified: Option<DateTime<Utc>>,
    pub last_google_modified: Option<DateTime<Utc>>,
    pub last_outlook_fingerprint: Option<u64>,
    pub last_google_fingerprint: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PairRow {
    pub fn id_on(&self, side: Origin) -> &str {
        match side {
            Origin::Outlook => &self.outlook_id,
            Origin::Google => &self.google_id,
        }
    }

    pub fn fingerprint_on(&self, side: Origin) -> Option<u64> {
        match side {
            Origin::Outlook => self.last_outlook_fingerprint,
            Origin::Google => self.last_google_fingerprint,
        }
    }

    pub fn set_fingerprint_on(&mut self, side: Origin, fp: Option<u64>) {
        match side {
            Origin::Outlook => self.last_outlook_fingerprint = fp,
            Origin::Google => self.last_google_fingerprint = fp,
        }
    }

    pub fn last_modified_on(&self, side: Origin) -> Option<DateTime<Utc>> {
        match side {
            Origin::Outlook => self.last_outlook_modified,
            Origin::Google => self.last_google_modified,
        }
    }

    pub fn set_last_modified_on(&mut self, side: Origin, at: Option<DateTime<Utc>>) {
        match side {
            Origin::Outlook => self.last_outlook_modified = at,
            Origin::Google => self.last_google_modified = at,
        }
    }
}

/// Persistent pair/cursor storage.
pub struct MappingStore {
    pool: SqlitePool,
}

impl MappingStore {
    /// Open or create the store at `path`. Schema migration is idempotent.
    pub async fn open(path: &Path) -> BridgeCalResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = MappingStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests and dry runs.
    pub async fn open_in_memory() -> BridgeCalResult<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = MappingStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> BridgeCalResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pair (
                outlook_id TEXT PRIMARY KEY,
                google_id TEXT NOT NULL UNIQUE,
                origin TEXT NOT NULL,
                last_outlook_modified TEXT,
                last_google_modified TEXT,
                last_outlook_fingerprint TEXT,
                last_google_fingerprint TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cursor (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pair_google ON pair(google_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_by_outlook(&self, id: &str) -> BridgeCalResult<Option<PairRow>> {
        let sql = format!("SELECT {PAIR_COLUMNS} FROM pair WHERE outlook_id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(row_from_sqlite).transpose()
    }

    pub async fn get_by_google(&self, id: &str) -> BridgeCalResult<Option<PairRow>> {
        let sql = format!("SELECT {PAIR_COLUMNS} FROM pair WHERE google_id = ?1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(row_from_sqlite).transpose()
    }

    pub async fn list_all(&self) -> BridgeCalResult<Vec<PairRow>> {
        let sql = format!("SELECT {PAIR_COLUMNS} FROM pair ORDER BY outlook_id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_from_sqlite).collect()
    }

    pub async fn list_where_outlook_in(&self, ids: &[String]) -> BridgeCalResult<Vec<PairRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {PAIR_COLUMNS} FROM pair WHERE outlook_id IN ({placeholders}) ORDER BY outlook_id"
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_from_sqlite).collect()
    }

    pub async fn upsert(&self, row: &PairRow) -> BridgeCalResult<()> {
        upsert_on(&self.pool, row).await
    }

    pub async fn delete(&self, row: &PairRow) -> BridgeCalResult<()> {
        delete_on(&self.pool, &row.outlook_id).await
    }

    pub async fn get_cursor(&self, name: &str) -> BridgeCalResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM cursor WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn set_cursor(&self, name: &str, value: &str) -> BridgeCalResult<()> {
        set_cursor_on(&self.pool, name, value).await
    }

    /// Begin a write transaction. Rolls back on drop without commit.
    pub async fn begin(&self) -> BridgeCalResult<MappingTx<'_>> {
        Ok(MappingTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// Atomic group of mapping mutations.
pub struct MappingTx<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl MappingTx<'_> {
    pub async fn upsert(&mut self, row: &PairRow) -> BridgeCalResult<()> {
        upsert_on(&mut *self.tx, row).await
    }

    pub async fn delete(&mut self, row: &PairRow) -> BridgeCalResult<()> {
        delete_on(&mut *self.tx, &row.outlook_id).await
    }

    pub async fn set_cursor(&mut self, name: &str, value: &str) -> BridgeCalResult<()> {
        set_cursor_on(&mut *self.tx, name, value).await
    }

    pub async fn commit(self) -> BridgeCalResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn upsert_on<'e, E>(executor: E, row: &PairRow) -> BridgeCalResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO pair (
            outlook_id, google_id, origin,
            last_outlook_modified, last_google_modified,
            last_outlook_fingerprint, last_google_fingerprint,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&row.outlook_id)
    .bind(&row.google_id)
    .bind(row.origin.as_str())
    .bind(row.last_outlook_modified.map(|t| t.to_rfc3339()))
    .bind(row.last_google_modified.map(|t| t.to_rfc3339()))
    .bind(row.last_outlook_fingerprint.map(fingerprint::to_hex))
    .bind(row.last_google_fingerprint.map(fingerprint::to_hex))
    .bind(row.created_at.to_rfc3339())
    .bind(row.updated_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

async fn delete_on<'e, E>(executor: E, outlook_id: &str) -> BridgeCalResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM pair WHERE outlook_id = ?1")
        .bind(outlook_id)
        .execute(executor)
        .await?;
    Ok(())
}

async fn set_cursor_on<'e, E>(executor: E, name: &str, value: &str) -> BridgeCalResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT OR REPLACE INTO cursor (name, value) VALUES (?1, ?2)")
        .bind(name)
        .bind(value)
        .execute(executor)
        .await?;
    Ok(())
}

fn row_from_sqlite(row: SqliteRow) -> BridgeCalResult<PairRow> {
    let origin: String = row.get("origin");
    let origin = origin
        .parse::<Origin>()
        .map_err(BridgeCalError::Serialization)?;

    Ok(PairRow {
        outlook_id: row.get("outlook_id"),
        google_id: row.get("google_id"),
        origin,
        last_outlook_modified: parse_time(row.get("last_outlook_modified"))?,
        last_google_modified: parse_time(row.get("last_google_modified"))?,
        last_outlook_fingerprint: parse_fingerprint(row.get("last_outlook_fingerprint"))?,
        last_google_fingerprint: parse_fingerprint(row.get("last_google_fingerprint"))?,
        created_at: required_time(row.get("created_at"))?,
        updated_at: required_time(row.get("updated_at"))?,
    })
}

fn parse_time(text: Option<String>) -> BridgeCalResult<Option<DateTime<Utc>>> {
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| BridgeCalError::Serialization(format!("bad timestamp '{t}': {e}")))
    })
    .transpose()
}

fn required_time(text: String) -> BridgeCalResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BridgeCalError::Serialization(format!("bad timestamp '{text}': {e}")))
}

fn parse_fingerprint(text: Option<String>) -> BridgeCalResult<Option<u64>> {
    text.map(|t| {
        fingerprint::from_hex(&t)
            .ok_or_else(|| BridgeCalError::Serialization(format!("bad fingerprint '{t}'")))
    })
    .transpose()
}
