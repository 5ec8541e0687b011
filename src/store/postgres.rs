//! Postgres token store.
//!
//! `take` is a single `DELETE ... RETURNING`; `replace` and `insert_unless_live`
//! run in one transaction each, and `replace` writes its rotation mark inside that
//! transaction. `insert_unless_live` takes a transaction-scoped advisory lock on
//! (user, kind) so two concurrent requests cannot both pass the liveness check.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{RotationMark, StoreError, TokenKind, TokenRecord, TokenStore};

pub const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/db/sql/01_noteauth.sql"
));

const RECORD_COLUMNS: &str = "id, kind, token_hash, user_id, created_at, expires_at";

/// Apply `db/sql/01_noteauth.sql`. Every statement is idempotent.
///
/// # Errors
/// Returns an error if the schema cannot be applied.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DDL",
        db.statement = "01_noteauth.sql"
    );
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .instrument(span)
        .await
        .map_err(backend)?;
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

pub(crate) fn backend(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn record_from_row(row: &PgRow) -> Result<TokenRecord, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    Ok(TokenRecord {
        id: row.try_get("id").map_err(backend)?,
        kind: kind.parse()?,
        token_hash: row.try_get("token_hash").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        expires_at: row.try_get("expires_at").map_err(backend)?,
    })
}

fn mark_from_row(row: &PgRow) -> Result<RotationMark, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    Ok(RotationMark {
        kind: kind.parse()?,
        old_hash: row.try_get("old_hash").map_err(backend)?,
        successor_hash: row.try_get("successor_hash").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        rotated_at: row.try_get("rotated_at").map_err(backend)?,
        expires_at: row.try_get("expires_at").map_err(backend)?,
    })
}

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E>(executor: E, record: &TokenRecord) -> Result<(), StoreError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = r"
            INSERT INTO auth_tokens (id, kind, token_hash, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(record.kind.as_str())
            .bind(&record.token_hash)
            .bind(record.user_id)
            .bind(record.created_at)
            .bind(record.expires_at)
            .execute(executor)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn put(&self, record: TokenRecord) -> Result<(), StoreError> {
        Self::insert(&self.pool, &record).await
    }

    async fn take(
        &self,
        kind: TokenKind,
        token_hash: &[u8],
    ) -> Result<Option<TokenRecord>, StoreError> {
        let query = format!(
            "DELETE FROM auth_tokens WHERE token_hash = $1 AND kind = $2 RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", &query))
            .await
            .map_err(backend)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn replace(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
        replacement: TokenRecord,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let query = format!(
            "DELETE FROM auth_tokens WHERE token_hash = $1 AND kind = $2 RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(old_hash)
            .bind(kind.as_str())
            .fetch_optional(&mut *tx)
            .instrument(db_span("DELETE", &query))
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Ok(None);
        };
        let old = record_from_row(&row)?;

        Self::insert(&mut *tx, &replacement).await?;

        let mark = RotationMark::new(&old, &replacement);
        let query = r"
            INSERT INTO auth_token_rotations
                (old_hash, kind, successor_hash, user_id, rotated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (old_hash) DO UPDATE
            SET kind = EXCLUDED.kind,
                successor_hash = EXCLUDED.successor_hash,
                user_id = EXCLUDED.user_id,
                rotated_at = EXCLUDED.rotated_at,
                expires_at = EXCLUDED.expires_at
        ";
        sqlx::query(query)
            .bind(&mark.old_hash)
            .bind(mark.kind.as_str())
            .bind(&mark.successor_hash)
            .bind(mark.user_id)
            .bind(mark.rotated_at)
            .bind(mark.expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(Some(old))
    }

    async fn find(
        &self,
        kind: TokenKind,
        token_hash: &[u8],
    ) -> Result<Option<TokenRecord>, StoreError> {
        let query =
            format!("SELECT {RECORD_COLUMNS} FROM auth_tokens WHERE token_hash = $1 AND kind = $2");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(backend)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_rotation(
        &self,
        kind: TokenKind,
        old_hash: &[u8],
    ) -> Result<Option<RotationMark>, StoreError> {
        let query = r"
            SELECT old_hash, kind, successor_hash, user_id, rotated_at, expires_at
            FROM auth_token_rotations
            WHERE old_hash = $1 AND kind = $2
        ";
        let row = sqlx::query(query)
            .bind(old_hash)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(backend)?;
        row.as_ref().map(mark_from_row).transpose()
    }

    async fn find_live_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        now: i64,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let query = format!(
            r"
            SELECT {RECORD_COLUMNS}
            FROM auth_tokens
            WHERE user_id = $1 AND kind = $2 AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(kind.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(backend)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_unless_live(&self, record: TokenRecord, now: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let query = "SELECT pg_advisory_xact_lock(hashtext($1))";
        sqlx::query(query)
            .bind(format!("{}:{}", record.user_id, record.kind))
            .execute(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(backend)?;

        let query = r"
            SELECT 1
            FROM auth_tokens
            WHERE user_id = $1 AND kind = $2 AND expires_at > $3
            LIMIT 1
        ";
        let outstanding = sqlx::query(query)
            .bind(record.user_id)
            .bind(record.kind.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .map_err(backend)?;

        if outstanding.is_some() {
            let _ = tx.rollback().await;
            return Ok(false);
        }

        Self::insert(&mut *tx, &record).await?;
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn delete_all_for_user(
        &self,
        user_id: Uuid,
        kind: Option<TokenKind>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let query = r"
            DELETE FROM auth_tokens
            WHERE user_id = $1 AND ($2::text IS NULL OR kind = $2)
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(kind.map(TokenKind::as_str))
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .map_err(backend)?;

        let query = r"
            DELETE FROM auth_token_rotations
            WHERE user_id = $1 AND ($2::text IS NULL OR kind = $2)
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(kind.map(TokenKind::as_str))
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn records_for_user(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> Result<Vec<TokenRecord>, StoreError> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM auth_tokens WHERE user_id = $1 AND kind = $2 ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(backend)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn purge_expired(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut purged = 0;
        for query in [
            "DELETE FROM auth_tokens WHERE expires_at <= $1",
            "DELETE FROM auth_token_rotations WHERE expires_at <= $1",
        ] {
            let result = sqlx::query(query)
                .bind(cutoff)
                .execute(&self.pool)
                .instrument(db_span("DELETE", query))
                .await
                .map_err(backend)?;
            purged += result.rows_affected();
        }
        Ok(purged)
    }
}
