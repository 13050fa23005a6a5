//! `PostgresKeyValueStore`: a single `kv_store` table backing the
//! [`KeyValueStore`]/[`KeyValueStoreCas`] ports over a real database.
//!
//! Every row is `(namespace, key)` keyed, with the value held as `jsonb` and
//! a `version` counter used for CAS. Callers that only need plain reads and
//! writes pay no CAS overhead beyond the version bump; CAS callers compare
//! against the version they last observed.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use sqlx::Row;

use upload_core::error::{PortError, PortResult};
use upload_core::ports::{CasOutcome, KeyValueStore, KeyValueStoreCas, Lookup, Version, VersionedLookup};

use crate::error::map_sqlx_error;

/// DDL for the single table this store needs. Idempotent; safe to run on
/// every startup.
const CREATE_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_store (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value JSONB NOT NULL,
    version BIGINT NOT NULL DEFAULT 1,
    PRIMARY KEY (namespace, key)
)";

/// Postgres-backed [`KeyValueStore`]/[`KeyValueStoreCas`] implementation.
///
/// `namespace` partitions the shared `kv_store` table between the different
/// record kinds a caller might store (upload metadata, job records, ...)
/// without requiring a dedicated table per kind.
pub struct PostgresKeyValueStore<T> {
    pool: PgPool,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PostgresKeyValueStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone,
{
    /// Construct a store scoped to `namespace`, backed by `pool`.
    #[must_use]
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            _marker: PhantomData,
        }
    }

    /// Create the backing table if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    pub async fn ensure_schema(pool: &PgPool) -> PortResult<()> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(pool)
            .await
            .map_err(|source| map_sqlx_error("ensure_schema", source))?;
        Ok(())
    }

    fn decode(operation: &'static str, raw: serde_json::Value) -> PortResult<T> {
        serde_json::from_value(raw).map_err(|source| PortError::Invalid {
            operation,
            message: source.to_string(),
        })
    }

    fn encode(operation: &'static str, value: &T) -> PortResult<serde_json::Value> {
        serde_json::to_value(value).map_err(|source| PortError::Invalid {
            operation,
            message: source.to_string(),
        })
    }
}

#[async_trait]
impl<T> KeyValueStore<T> for PostgresKeyValueStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone,
{
    async fn get(&self, key: &str) -> PortResult<Lookup<T>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE namespace = $1 AND key = $2")
            .bind(&self.namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| map_sqlx_error("get", source))?;

        match row {
            Some(row) => {
                let raw: serde_json::Value = row.try_get("value").map_err(|source| map_sqlx_error("get", source))?;
                Ok(Lookup::Found(Self::decode("get", raw)?))
            }
            None => Ok(Lookup::NotFound),
        }
    }

    async fn set(&self, key: &str, value: T, _ttl: Option<Duration>) -> PortResult<()> {
        let encoded = Self::encode("set", &value)?;
        sqlx::query(
            "INSERT INTO kv_store (namespace, key, value, version) VALUES ($1, $2, $3, 1)
             ON CONFLICT (namespace, key) DO UPDATE SET value = EXCLUDED.value, version = kv_store.version + 1",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .map_err(|source| map_sqlx_error("set", source))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = $1 AND key = $2")
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|source| map_sqlx_error("delete", source))?;
        Ok(())
    }

    async fn has(&self, key: &str) -> PortResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM kv_store WHERE namespace = $1 AND key = $2) AS present",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|source| map_sqlx_error("has", source))?;
        row.try_get("present").map_err(|source| map_sqlx_error("has", source))
    }

    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, T)>> {
        let rows = sqlx::query("SELECT key, value FROM kv_store WHERE namespace = $1 AND key = ANY($2)")
            .bind(&self.namespace)
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| map_sqlx_error("get_many", source))?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(|source| map_sqlx_error("get_many", source))?;
                let raw: serde_json::Value =
                    row.try_get("value").map_err(|source| map_sqlx_error("get_many", source))?;
                Ok((key, Self::decode("get_many", raw)?))
            })
            .collect()
    }

    async fn set_many(&self, items: Vec<(String, T)>, ttl: Option<Duration>) -> PortResult<()> {
        for (key, value) in items {
            self.set(&key, value, ttl).await?;
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = $1 AND key = ANY($2)")
            .bind(&self.namespace)
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(|source| map_sqlx_error("delete_many", source))?;
        Ok(())
    }
}

#[async_trait]
impl<T> KeyValueStoreCas<T> for PostgresKeyValueStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone,
{
    async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<T>> {
        let row = sqlx::query("SELECT value, version FROM kv_store WHERE namespace = $1 AND key = $2")
            .bind(&self.namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| map_sqlx_error("get_versioned", source))?;

        match row {
            Some(row) => {
                let raw: serde_json::Value =
                    row.try_get("value").map_err(|source| map_sqlx_error("get_versioned", source))?;
                let version: i64 = row
                    .try_get("version")
                    .map_err(|source| map_sqlx_error("get_versioned", source))?;
                Ok(VersionedLookup::Found {
                    value: Self::decode("get_versioned", raw)?,
                    version: Version(u64::try_from(version).unwrap_or(0)),
                })
            }
            None => Ok(VersionedLookup::NotFound),
        }
    }

    async fn set_if_version(
        &self,
        key: &str,
        value: T,
        expected: Version,
        _ttl: Option<Duration>,
    ) -> PortResult<CasOutcome> {
        let encoded = Self::encode("set_if_version", &value)?;
        let expected_version = i64::try_from(expected.0).unwrap_or(i64::MAX);

        let updated = sqlx::query(
            "UPDATE kv_store SET value = $1, version = version + 1
             WHERE namespace = $2 AND key = $3 AND version = $4
             RETURNING version",
        )
        .bind(encoded)
        .bind(&self.namespace)
        .bind(key)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|source| map_sqlx_error("set_if_version", source))?;

        if let Some(row) = updated {
            let version: i64 = row
                .try_get("version")
                .map_err(|source| map_sqlx_error("set_if_version", source))?;
            return Ok(CasOutcome::Written {
                version: Version(u64::try_from(version).unwrap_or(0)),
            });
        }

        // No row matched the expected version; distinguish "never existed"
        // from "exists but was modified concurrently".
        if self.has(key).await? {
            Ok(CasOutcome::Conflict)
        } else {
            Ok(CasOutcome::NotFound)
        }
    }
}
