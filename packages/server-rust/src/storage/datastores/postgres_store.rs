//! PostgreSQL [`BackingStore`] over a `sqlx` connection pool.
//!
//! One table per kind, `bs_<kind>`, with a `BIGSERIAL` surrogate id used for
//! cursoring, a unique natural key column, and the encoded fields as
//! `BYTEA`. Tables are created if missing; versioned migration is left to
//! external tooling.

use async_trait::async_trait;
use banstick_core::{EntityKind, SurrogateId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::service::config::StoreConfig;
use crate::storage::backing_store::{BackingStore, DuplicateKey};
use crate::storage::record::StoredRecord;

fn table_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Player => "bs_player",
        EntityKind::Ban => "bs_ban",
        EntityKind::Session => "bs_session",
        EntityKind::Share => "bs_share",
        EntityKind::Ip => "bs_ip",
        EntityKind::IpData => "bs_ip_data",
    }
}

fn to_sid(id: SurrogateId) -> anyhow::Result<i64> {
    Ok(i64::try_from(id.get())?)
}

fn from_sid(sid: i64) -> anyhow::Result<SurrogateId> {
    Ok(SurrogateId(u64::try_from(sid)?))
}

fn record(row: (i64, String, Vec<u8>)) -> anyhow::Result<StoredRecord> {
    let (sid, key, payload) = row;
    Ok(StoredRecord {
        id: from_sid(sid)?,
        key,
        payload,
    })
}

/// Pooled PostgreSQL store.
pub struct PostgresBackingStore {
    pool: PgPool,
}

impl PostgresBackingStore {
    /// Builds the pool from `config`. Connections are opened lazily up to
    /// `pool_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be established.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await?;
        Ok(Self::with_pool(pool))
    }

    #[must_use]
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BackingStore for PostgresBackingStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        for kind in EntityKind::ALL {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    sid BIGSERIAL PRIMARY KEY,
                    natural_key TEXT NOT NULL UNIQUE,
                    payload BYTEA NOT NULL
                )",
                table_name(kind)
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        info!(pool_size = self.pool.size(), "postgres tables ready");
        Ok(())
    }

    async fn read_by_key(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let sql = format!(
            "SELECT sid, natural_key, payload FROM {} WHERE natural_key = $1",
            table_name(kind)
        );
        let row: Option<(i64, String, Vec<u8>)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(record).transpose()
    }

    async fn read_range(
        &self,
        kind: EntityKind,
        after: SurrogateId,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT sid, natural_key, payload FROM {} WHERE sid > $1 ORDER BY sid ASC LIMIT $2",
            table_name(kind)
        );
        let rows: Vec<(i64, String, Vec<u8>)> = sqlx::query_as(&sql)
            .bind(to_sid(after)?)
            .bind(i64::try_from(limit)?)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(record).collect()
    }

    async fn upsert(&self, kind: EntityKind, record: &StoredRecord) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO {} (sid, natural_key, payload) VALUES ($1, $2, $3)
             ON CONFLICT (sid) DO UPDATE
             SET natural_key = EXCLUDED.natural_key, payload = EXCLUDED.payload",
            table_name(kind)
        );
        sqlx::query(&sql)
            .bind(to_sid(record.id)?)
            .bind(&record.key)
            .bind(&record.payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_and_assign_id(
        &self,
        kind: EntityKind,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> anyhow::Result<StoredRecord> {
        let table = table_name(kind);
        let sql = format!(
            "WITH next AS (SELECT nextval(pg_get_serial_sequence('{table}', 'sid')) AS sid)
             INSERT INTO {table} (sid, natural_key, payload)
             SELECT sid, COALESCE($1, sid::text), $2 FROM next
             RETURNING sid, natural_key"
        );
        let result: Result<(i64, String), sqlx::Error> = sqlx::query_as(&sql)
            .bind(key)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await;
        match result {
            Ok((sid, key)) => Ok(StoredRecord {
                id: from_sid(sid)?,
                key,
                payload,
            }),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(DuplicateKey {
                    kind,
                    key: key.unwrap_or_default().to_owned(),
                }
                .into())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_its_own_table() {
        let mut names: Vec<&str> = EntityKind::ALL.iter().map(|&k| table_name(k)).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn surrogate_ids_outside_bigint_are_rejected() {
        assert!(to_sid(SurrogateId(u64::MAX)).is_err());
        assert!(from_sid(-1).is_err());
        assert_eq!(to_sid(SurrogateId(7)).unwrap(), 7);
    }
}
