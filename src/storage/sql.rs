// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational backend over the sqlx `Any` driver (SQLite and MySQL).
//!
//! Statements use positional `?` placeholders, which both dialects accept.
//! Rows come back as JSON maps so the search layer never sees driver types.
//!
//! Catalog schema (created by [`SqlBackend::ensure_catalog_schema`]):
//! ```sql
//! CREATE TABLE materials (
//!   id VARCHAR(255) PRIMARY KEY,
//!   name TEXT NOT NULL,
//!   sku VARCHAR(255),
//!   unit VARCHAR(64),
//!   color VARCHAR(64),
//!   category VARCHAR(255)
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver hands MySQL TEXT columns back as BLOB, so decoding
//! falls through `i64 → f64 → String → Vec<u8>` and converts bytes to UTF-8.

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row as _};
use tracing::{debug, info};

use super::traits::{BackendError, HealthProbe, RelationalBackend, RelationalTransaction, Row};
use crate::resilience::retry::{retry, RetryConfig};
use crate::search::{is_identifier, SqlParam};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

fn map_sqlx_error(err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::PoolTimedOut => BackendError::Timeout(Duration::ZERO),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => BackendError::Connection(err.to_string()),
        other => BackendError::Query(other.to_string()),
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Integer(i) => query.bind(*i),
            SqlParam::Numeric(f) => query.bind(*f),
            SqlParam::Boolean(b) => query.bind(*b),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

fn decode_column(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Value::Null, Value::String);
    }
    // MySQL TEXT via Any arrives as BLOB
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(Value::Null, |bytes| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Value::Null
}

fn decode_row(row: &AnyRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), decode_column(row, col.ordinal())))
        .collect()
}

pub struct SqlBackend {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlBackend {
    /// Connect with startup-mode retry (fails fast if the URL is wrong).
    pub async fn connect(connection_string: &str) -> Result<Self, BackendError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        let backend = Self { pool, is_sqlite };
        if is_sqlite {
            backend.enable_wal_mode().await?;
        }
        info!(sqlite = is_sqlite, "Relational backend connected");
        Ok(backend)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), BackendError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| BackendError::Connection(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BackendError::Connection(format!("Failed to set synchronous mode: {}", e))
            })?;
        Ok(())
    }

    /// Create the catalog table (and a SKU index on SQLite) if missing.
    pub async fn ensure_catalog_schema(&self, table: &str) -> Result<(), BackendError> {
        if !is_identifier(table) {
            return Err(BackendError::Query(format!("invalid table name: {table}")));
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id VARCHAR(255) PRIMARY KEY,
                name TEXT NOT NULL,
                sku VARCHAR(255),
                unit VARCHAR(64),
                color VARCHAR(64),
                category VARCHAR(255)
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(map_sqlx_error)?;

        if self.is_sqlite {
            let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_sku ON {table}(sku)");
            sqlx::query(&index).execute(&self.pool).await.map_err(map_sqlx_error)?;
        }
        debug!(table, "Catalog schema ensured");
        Ok(())
    }
}

#[async_trait]
impl RelationalBackend for SqlBackend {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, BackendError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, BackendError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn RelationalTransaction>, BackendError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqlTransaction { tx }))
    }

    async fn health_check(&self) -> Result<HealthProbe, BackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx_error)?;
        let dialect = if self.is_sqlite { "sqlite" } else { "mysql" };
        Ok(HealthProbe::healthy(format!(
            "{dialect}, pool {}/{} idle",
            self.pool.num_idle(),
            self.pool.size()
        )))
    }
}

pub struct SqlTransaction {
    tx: sqlx::Transaction<'static, Any>,
}

#[async_trait]
impl RelationalTransaction for SqlTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, BackendError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), BackendError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
