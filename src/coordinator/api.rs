// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record-level API: lookups, writes, counts and SKU resolution.
//!
//! Reads go through the tiered cache, then through the fallback chain
//! (relational first when active, vector store second). Writes go to
//! every active, healthy store, then delete the exact `material:<id>` key
//! and invalidate `search:*` and `vector_search:*`.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::keys::{SEARCH_PATTERN, VECTOR_SEARCH_PATTERN};
use crate::cache::material_key;
use crate::error::HybridError;
use crate::search::{MaterialRecord, SqlParam};
use crate::sku::{SkuRequest, SkuResolution};
use crate::storage::traits::{BackendError, BackendKind, VectorPoint};

use super::types::{CatalogStats, WriteReport};
use super::HybridSearchEngine;

impl HybridSearchEngine {
    /// Backends that hold catalog records, authoritative first.
    fn record_chain(&self) -> Vec<BackendKind> {
        let mut chain = Vec::with_capacity(2);
        if self.config.relational_active() {
            chain.push(BackendKind::Relational);
        }
        if self.config.enable_vector {
            chain.push(BackendKind::Vector);
        }
        chain
    }

    /// Get a record by id. `Ok(None)` when the serving backend has no such
    /// record (a miss is not a reason to fall back).
    #[tracing::instrument(skip(self))]
    pub async fn get_material(&self, id: &str) -> Result<Option<MaterialRecord>, HybridError> {
        if id.trim().is_empty() {
            return Err(HybridError::Validation("record id is empty".into()));
        }
        let key = material_key(id);
        if let Some(record) = self.cache.get::<MaterialRecord>(&key).await {
            return Ok(Some(record));
        }

        let (record, backend) = self
            .fallback
            .execute("get_material", &self.record_chain(), |backend| async move {
                match backend {
                    BackendKind::Relational => {
                        let sql =
                            format!("SELECT * FROM {} WHERE id = ? LIMIT 1", self.config.table);
                        let rows = self.backends.relational.query(&sql, &[id.into()]).await?;
                        Ok(rows.first().and_then(MaterialRecord::from_row))
                    }
                    BackendKind::Vector => {
                        let point =
                            self.backends.vector.get_by_id(&self.config.collection, id).await?;
                        Ok(point.and_then(|p| MaterialRecord::from_payload(&p.payload)))
                    }
                    BackendKind::Cache => Ok(None),
                }
            })
            .await?;

        if let Some(record) = &record {
            debug!(id, backend = %backend, "Record loaded");
            self.cache.set(&key, record, self.config.record_cache_ttl()).await;
        }
        Ok(record)
    }

    /// Insert or replace a record in every active store.
    ///
    /// Succeeds when at least one store took the write; a store that
    /// failed is marked unhealthy like any other failed call.
    #[tracing::instrument(skip(self, record), fields(id = %record.id))]
    pub async fn upsert_material(
        &self,
        record: MaterialRecord,
    ) -> Result<WriteReport, HybridError> {
        if record.id.trim().is_empty() || record.name.trim().is_empty() {
            return Err(HybridError::Validation("record id and name are required".into()));
        }
        let start = Instant::now();
        let mut errors = BTreeMap::new();

        let vector = self.config.enable_vector
            && self
                .write_to(BackendKind::Vector, &mut errors, self.write_vector(&record))
                .await;
        let relational = self.config.relational_active()
            && self
                .write_to(BackendKind::Relational, &mut errors, self.write_relational(&record))
                .await;

        if !vector && !relational {
            return Err(self.exhausted("upsert_material", errors, start));
        }
        let invalidated = self.invalidate_record(&record.id).await;
        Ok(WriteReport { record_id: record.id, vector, relational, invalidated })
    }

    /// Remove a record from every active store.
    #[tracing::instrument(skip(self))]
    pub async fn delete_material(&self, id: &str) -> Result<WriteReport, HybridError> {
        if id.trim().is_empty() {
            return Err(HybridError::Validation("record id is empty".into()));
        }
        let start = Instant::now();
        let mut errors = BTreeMap::new();

        let vector_delete = async {
            self.backends
                .vector
                .delete(&self.config.collection, &[id.to_string()])
                .await
                .map(|_| ())
        };
        let relational_delete = async {
            let sql = format!("DELETE FROM {} WHERE id = ?", self.config.table);
            self.backends.relational.execute(&sql, &[id.into()]).await.map(|_| ())
        };

        let vector = self.config.enable_vector
            && self.write_to(BackendKind::Vector, &mut errors, vector_delete).await;
        let relational = self.config.relational_active()
            && self
                .write_to(BackendKind::Relational, &mut errors, relational_delete)
                .await;

        if !vector && !relational {
            return Err(self.exhausted("delete_material", errors, start));
        }
        let invalidated = self.invalidate_record(id).await;
        Ok(WriteReport { record_id: id.to_string(), vector, relational, invalidated })
    }

    /// Number of catalog records, from the first backend that answers.
    pub async fn catalog_stats(&self) -> Result<CatalogStats, HybridError> {
        let (records, source) = self
            .fallback
            .execute("catalog_stats", &self.record_chain(), |backend| async move {
                match backend {
                    BackendKind::Relational => {
                        let sql = format!("SELECT COUNT(*) AS n FROM {}", self.config.table);
                        let rows = self.backends.relational.query(&sql, &[]).await?;
                        rows.first()
                            .and_then(|row| row.get("n"))
                            .and_then(count_value)
                            .ok_or_else(|| BackendError::Query("COUNT(*) returned no value".into()))
                    }
                    BackendKind::Vector => {
                        self.backends.vector.count(&self.config.collection).await
                    }
                    BackendKind::Cache => {
                        Err(BackendError::Disabled("cache holds no records".into()))
                    }
                }
            })
            .await?;
        Ok(CatalogStats { records, source })
    }

    /// Resolve a free-text description plus unit (and optional color) to
    /// a catalog SKU. See [`crate::sku`].
    pub async fn resolve_sku(&self, request: &SkuRequest) -> Result<SkuResolution, HybridError> {
        if !self.config.enable_vector {
            return Err(HybridError::Validation("SKU resolution needs the vector strategy".into()));
        }
        self.resolver.resolve(request).await
    }

    // --- Internal helpers ---

    /// Run one store write unless the store is unhealthy; record the
    /// outcome in the tracker and in `errors`.
    async fn write_to<F>(
        &self,
        backend: BackendKind,
        errors: &mut BTreeMap<BackendKind, String>,
        write: F,
    ) -> bool
    where
        F: Future<Output = Result<(), BackendError>>,
    {
        let health = self.health();
        if !health.is_healthy(backend) {
            let last = health.last_error(backend).unwrap_or_else(|| "marked unhealthy".to_string());
            errors.insert(backend, format!("skipped: {}", last));
            return false;
        }
        match write.await {
            Ok(()) => {
                health.record_success(backend);
                true
            }
            Err(e) => {
                warn!(backend = %backend, error = %e, "Write failed");
                let message = e.to_string();
                health.record_failure(backend, &message);
                errors.insert(backend, message);
                false
            }
        }
    }

    async fn write_vector(&self, record: &MaterialRecord) -> Result<(), BackendError> {
        let vector = self.backends.embedder.embed(&record.name).await?;
        let point = VectorPoint { id: record.id.clone(), vector, payload: record.to_payload() };
        self.backends.vector.upsert(&self.config.collection, vec![point]).await?;
        Ok(())
    }

    /// Delete-then-insert in one transaction; portable across SQLite and MySQL.
    async fn write_relational(&self, record: &MaterialRecord) -> Result<(), BackendError> {
        let table = &self.config.table;
        let delete = format!("DELETE FROM {table} WHERE id = ?");
        let insert = format!(
            "INSERT INTO {table} (id, name, sku, unit, color, category) VALUES (?, ?, ?, ?, ?, ?)"
        );
        let params: [SqlParam; 6] = [
            record.id.as_str().into(),
            record.name.as_str().into(),
            record.sku.clone().into(),
            record.unit.clone().into(),
            record.color.clone().into(),
            record.category.clone().into(),
        ];

        let mut tx = self.backends.relational.begin_transaction().await?;
        let written = async {
            tx.execute(&delete, &[record.id.as_str().into()]).await?;
            tx.execute(&insert, &params).await?;
            Ok::<_, BackendError>(())
        }
        .await;

        match written {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Ids are arbitrary text, so the record key is deleted exactly and
    /// only the fixed search families go through pattern invalidation.
    async fn invalidate_record(&self, id: &str) -> u64 {
        self.cache.delete(&material_key(id)).await;
        self.cache.invalidate(SEARCH_PATTERN).await
            + self.cache.invalidate(VECTOR_SEARCH_PATTERN).await
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
