//! TursoCatalogStore - CatalogStore Implementation for Turso/libsql
//!
//! Thin wrapper around [`DatabaseService`]: every method delegates to a `db_*`
//! call and converts between libsql rows and catalog models. No tree logic
//! lives here.
//!
//! # Row Conversion
//!
//! - `level` and `sort_order` are INTEGER columns
//! - flags are 0/1 INTEGER columns
//! - `base_price` is TEXT holding the decimal string
//! - timestamps are TEXT, RFC 3339 or SQLite's `CURRENT_TIMESTAMP` format

use crate::db::catalog_store::{CatalogStore, SnapshotWrite, StoredSnapshot};
use crate::db::database::DbCatalogRowParams;
use crate::db::DatabaseService;
use crate::models::CatalogRow;
use crate::operations::ChangeSet;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;
use std::str::FromStr;
use std::sync::Arc;

/// `CatalogStore` backed by a local libsql database
pub struct TursoCatalogStore {
    db: Arc<DatabaseService>,
}

impl TursoCatalogStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    ///
    /// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
    /// Rows written by the engine use RFC3339: "YYYY-MM-DDTHH:MM:SS.ffffff+00:00"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(anyhow::anyhow!(
            "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
            s
        ))
    }

    /// Convert a libsql row in `CATALOG_ROW_COLUMNS` order to a `CatalogRow`
    fn row_to_catalog_row(row: &Row) -> Result<CatalogRow> {
        let id: String = row.get(0).context("Failed to get id")?;
        let parent_id: Option<String> = row.get(1).context("Failed to get parent_id")?;
        let level: i64 = row.get(2).context("Failed to get level")?;
        let sort_order: i64 = row.get(3).context("Failed to get sort_order")?;
        let name: String = row.get(4).context("Failed to get name")?;
        let description: Option<String> = row.get(5).context("Failed to get description")?;
        let is_optional: i64 = row.get(6).context("Failed to get is_optional")?;
        let is_recurring: i64 = row.get(7).context("Failed to get is_recurring")?;
        let is_mutually_exclusive: i64 =
            row.get(8).context("Failed to get is_mutually_exclusive")?;
        let base_price_str: String = row.get(9).context("Failed to get base_price")?;
        let created_at_str: String = row.get(10).context("Failed to get created_at")?;
        let updated_at_str: String = row.get(11).context("Failed to get updated_at")?;

        let level = u8::try_from(level)
            .with_context(|| format!("Row '{}' has out-of-range level {}", id, level))?;
        let base_price = BigDecimal::from_str(&base_price_str)
            .with_context(|| format!("Row '{}' has invalid base_price '{}'", id, base_price_str))?;
        let created_at =
            Self::parse_timestamp(&created_at_str).context("Failed to parse created_at")?;
        let updated_at =
            Self::parse_timestamp(&updated_at_str).context("Failed to parse updated_at")?;

        Ok(CatalogRow {
            id,
            parent_id,
            level,
            sort_order,
            name,
            description,
            is_optional: is_optional != 0,
            is_recurring: is_recurring != 0,
            is_mutually_exclusive: is_mutually_exclusive != 0,
            base_price,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl CatalogStore for TursoCatalogStore {
    async fn load_rows(&self) -> Result<Vec<CatalogRow>> {
        let mut rows = self
            .db
            .db_load_rows()
            .await
            .context("Failed to load catalog rows")?;

        let mut catalog_rows = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch row: {}", e))?
        {
            catalog_rows.push(Self::row_to_catalog_row(&row)?);
        }

        Ok(catalog_rows)
    }

    async fn insert_row(&self, row: &CatalogRow) -> Result<()> {
        self.db
            .db_insert_row(DbCatalogRowParams::from_row(row))
            .await?;
        Ok(())
    }

    async fn update_row(&self, row: &CatalogRow) -> Result<()> {
        self.db
            .db_update_row(DbCatalogRowParams::from_row(row))
            .await?;
        Ok(())
    }

    async fn delete_row(&self, id: &str) -> Result<bool> {
        let rows_affected = self.db.db_delete_row(id).await?;
        Ok(rows_affected > 0)
    }

    async fn apply_changes(&self, changes: &ChangeSet) -> Result<()> {
        self.db.db_apply_changes(changes).await?;
        Ok(())
    }

    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<StoredSnapshot>> {
        let Some(row) = self
            .db
            .db_load_snapshot(snapshot_id)
            .await
            .context("Failed to load catalog snapshot")?
        else {
            return Ok(None);
        };

        let version: i64 = row.get(0).context("Failed to get version")?;
        let document: String = row.get(1).context("Failed to get document")?;
        let saved_at_str: String = row.get(2).context("Failed to get saved_at")?;

        Ok(Some(StoredSnapshot {
            version: u64::try_from(version)
                .with_context(|| format!("Snapshot has negative version {}", version))?,
            document,
            saved_at: Self::parse_timestamp(&saved_at_str).context("Failed to parse saved_at")?,
        }))
    }

    async fn save_snapshot(
        &self,
        snapshot_id: &str,
        expected_version: u64,
        document: &str,
    ) -> Result<SnapshotWrite> {
        let saved_at = Utc::now().to_rfc3339();
        let outcome = self
            .db
            .db_save_snapshot(snapshot_id, expected_version, document, &saved_at)
            .await?;
        Ok(outcome)
    }

    async fn close(&self) -> Result<()> {
        self.db
            .db_close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close database: {}", e))?;

        Ok(())
    }
}
