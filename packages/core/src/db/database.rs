//! Database Connection Management
//!
//! This module provides the database connection and schema for the catalog,
//! using libsql/Turso as an embedded SQLite-compatible engine.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Two tables**: `catalog_nodes` (flat parent-pointer rows) and
//!   `catalog_snapshots` (versioned nested JSON documents)
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **No parent foreign key**: orphaned rows must still load so they can be
//!   promoted to roots instead of being rejected by the engine
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. It sets a 5-second busy
//! timeout so concurrent writers wait instead of failing with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use carecatalog_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let db_service = DatabaseService::new(PathBuf::from("./data/catalog.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::catalog_store::SnapshotWrite;
use crate::db::error::DatabaseError;
use crate::models::CatalogRow;
use crate::operations::{ChangeSet, PersistenceOperation, RowChange};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Columns of `catalog_nodes`, in the order every SELECT returns them
pub const CATALOG_ROW_COLUMNS: &str = "id, parent_id, level, sort_order, name, description, \
     is_optional, is_recurring, is_mutually_exclusive, base_price, created_at, updated_at";

const INSERT_ROW_SQL: &str = "INSERT INTO catalog_nodes (id, parent_id, level, sort_order, name, \
     description, is_optional, is_recurring, is_mutually_exclusive, base_price, created_at, updated_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_ROW_SQL: &str = "UPDATE catalog_nodes SET parent_id = ?, level = ?, sort_order = ?, \
     name = ?, description = ?, is_optional = ?, is_recurring = ?, is_mutually_exclusive = ?, \
     base_price = ?, created_at = ?, updated_at = ? WHERE id = ?";

const DELETE_ROW_SQL: &str = "DELETE FROM catalog_nodes WHERE id = ?";

/// Database service for managing libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use carecatalog_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/catalog.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Column values of one `catalog_nodes` row, already encoded for SQL
///
/// Flags are stored as 0/1 integers, `base_price` as its decimal string and
/// timestamps as RFC 3339.
pub struct DbCatalogRowParams<'a> {
    pub id: &'a str,
    pub parent_id: Option<&'a str>,
    pub level: i64,
    pub sort_order: i64,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub is_optional: bool,
    pub is_recurring: bool,
    pub is_mutually_exclusive: bool,
    pub base_price: String,
    pub created_at: String,
    pub updated_at: String,
}

impl<'a> DbCatalogRowParams<'a> {
    pub fn from_row(row: &'a CatalogRow) -> Self {
        Self {
            id: &row.id,
            parent_id: row.parent_id.as_deref(),
            level: i64::from(row.level),
            sort_order: row.sort_order,
            name: &row.name,
            description: row.description.as_deref(),
            is_optional: row.is_optional,
            is_recurring: row.is_recurring,
            is_mutually_exclusive: row.is_mutually_exclusive,
            base_price: row.base_price.to_string(),
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::info!("Catalog database ready at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: every statement is `IF NOT EXISTS`.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS catalog_nodes (
                id TEXT PRIMARY KEY,
                parent_id TEXT,
                level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 4),
                sort_order INTEGER NOT NULL DEFAULT 0,
                name TEXT NOT NULL,
                description TEXT,
                is_optional INTEGER NOT NULL DEFAULT 0,
                is_recurring INTEGER NOT NULL DEFAULT 0,
                is_mutually_exclusive INTEGER NOT NULL DEFAULT 0,
                -- Decimal kept as text so no precision is lost
                base_price TEXT NOT NULL DEFAULT '0',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create catalog_nodes table: {}",
                e
            ))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS catalog_snapshots (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                document TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create catalog_snapshots table: {}",
                e
            ))
        })?;

        self.create_indexes(&conn).await?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        for (name, sql) in [
            (
                "idx_catalog_nodes_parent",
                "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_parent ON catalog_nodes(parent_id)",
            ),
            (
                "idx_catalog_nodes_sibling_order",
                "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_sibling_order ON catalog_nodes(parent_id, sort_order)",
            ),
        ] {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }
        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// Only use in synchronous contexts; async code should call
    /// [`connect_with_timeout`](Self::connect_with_timeout).
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    //
    // CATALOG ROW OPERATIONS
    //

    /// Fetch every catalog row
    ///
    /// Returns raw rows in `CATALOG_ROW_COLUMNS` order; the store converts them.
    pub async fn db_load_rows(&self) -> Result<libsql::Rows, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM catalog_nodes ORDER BY level, sort_order, created_at, id",
                CATALOG_ROW_COLUMNS
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare load_rows query: {}", e))
            })?;

        stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute load_rows query: {}", e))
        })
    }

    async fn execute_insert(
        conn: &libsql::Connection,
        params: &DbCatalogRowParams<'_>,
    ) -> Result<u64, libsql::Error> {
        conn.execute(
            INSERT_ROW_SQL,
            libsql::params![
                params.id,
                params.parent_id,
                params.level,
                params.sort_order,
                params.name,
                params.description,
                i64::from(params.is_optional),
                i64::from(params.is_recurring),
                i64::from(params.is_mutually_exclusive),
                params.base_price.as_str(),
                params.created_at.as_str(),
                params.updated_at.as_str(),
            ],
        )
        .await
    }

    async fn execute_update(
        conn: &libsql::Connection,
        params: &DbCatalogRowParams<'_>,
    ) -> Result<u64, libsql::Error> {
        conn.execute(
            UPDATE_ROW_SQL,
            libsql::params![
                params.parent_id,
                params.level,
                params.sort_order,
                params.name,
                params.description,
                i64::from(params.is_optional),
                i64::from(params.is_recurring),
                i64::from(params.is_mutually_exclusive),
                params.base_price.as_str(),
                params.created_at.as_str(),
                params.updated_at.as_str(),
                params.id,
            ],
        )
        .await
    }

    /// Insert a single catalog row
    pub async fn db_insert_row(&self, params: DbCatalogRowParams<'_>) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        Self::execute_insert(&conn, &params).await.map_err(|e| {
            DatabaseError::row_write_failed(PersistenceOperation::InsertRow, params.id, e.to_string())
        })?;

        Ok(())
    }

    /// Overwrite a single catalog row
    ///
    /// A row that does not exist is reported as a failed update.
    pub async fn db_update_row(&self, params: DbCatalogRowParams<'_>) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let affected = Self::execute_update(&conn, &params).await.map_err(|e| {
            DatabaseError::row_write_failed(PersistenceOperation::UpdateRow, params.id, e.to_string())
        })?;

        if affected == 0 {
            return Err(DatabaseError::row_write_failed(
                PersistenceOperation::UpdateRow,
                params.id,
                "row does not exist",
            ));
        }

        Ok(())
    }

    /// Delete a single catalog row, returning the number of rows removed
    pub async fn db_delete_row(&self, id: &str) -> Result<u64, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute(DELETE_ROW_SQL, [id]).await.map_err(|e| {
            DatabaseError::row_write_failed(PersistenceOperation::DeleteRow, id, e.to_string())
        })
    }

    /// Apply every row change of one mutation inside one transaction
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::RowWriteFailed` naming the first row that
    /// failed; the transaction is rolled back, so none of the rows are kept.
    pub async fn db_apply_changes(&self, changes: &ChangeSet) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }

        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        for change in changes.iter() {
            let result = match change {
                RowChange::Insert(row) => {
                    Self::execute_insert(&conn, &DbCatalogRowParams::from_row(row))
                        .await
                        .map_err(|e| e.to_string())
                }
                RowChange::Update(row) => {
                    match Self::execute_update(&conn, &DbCatalogRowParams::from_row(row)).await {
                        Ok(0) => Err("row does not exist".to_string()),
                        Ok(_) => Ok(0),
                        Err(e) => Err(e.to_string()),
                    }
                }
                RowChange::Delete { id } => conn
                    .execute(DELETE_ROW_SQL, [id.as_str()])
                    .await
                    .map_err(|e| e.to_string()),
            };

            if let Err(reason) = result {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::row_write_failed(
                    change.operation(),
                    change.node_id(),
                    reason,
                ));
            }
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(())
    }

    //
    // SNAPSHOT OPERATIONS
    //

    /// Fetch the snapshot row (`version, document, saved_at`) for `snapshot_id`
    pub async fn db_load_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<libsql::Row>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare("SELECT version, document, saved_at FROM catalog_snapshots WHERE id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare load_snapshot query: {}",
                    e
                ))
            })?;

        let mut rows = stmt.query([snapshot_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute load_snapshot query: {}", e))
        })?;

        rows.next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))
    }

    /// Write a snapshot if the stored version still equals `expected_version`
    ///
    /// Runs as `BEGIN IMMEDIATE` so the version check and the write cannot be
    /// interleaved with another writer. A missing row counts as version 0.
    pub async fn db_save_snapshot(
        &self,
        snapshot_id: &str,
        expected_version: u64,
        document: &str,
        saved_at: &str,
    ) -> Result<SnapshotWrite, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let current = match Self::current_version(&conn, snapshot_id).await {
            Ok(version) => version,
            Err(e) => {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(e);
            }
        };

        if current != expected_version {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Ok(SnapshotWrite::Conflict {
                actual_version: current,
            });
        }

        let next_version = expected_version + 1;
        let write = conn
            .execute(
                "INSERT INTO catalog_snapshots (id, version, document, saved_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET version = excluded.version,
                     document = excluded.document, saved_at = excluded.saved_at",
                libsql::params![snapshot_id, next_version as i64, document, saved_at],
            )
            .await;

        if let Err(e) = write {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to write snapshot '{}': {}",
                snapshot_id, e
            )));
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }

        Ok(SnapshotWrite::Saved {
            version: next_version,
        })
    }

    async fn current_version(
        conn: &libsql::Connection,
        snapshot_id: &str,
    ) -> Result<u64, DatabaseError> {
        let mut stmt = conn
            .prepare("SELECT version FROM catalog_snapshots WHERE id = ?")
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to prepare version query: {}", e))
            })?;
        let mut rows = stmt.query([snapshot_id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute version query: {}", e))
        })?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => {
                let version: i64 = row.get(0).map_err(DatabaseError::LibsqlError)?;
                u64::try_from(version).map_err(|_| {
                    DatabaseError::sql_execution(format!(
                        "snapshot '{}' has negative version {}",
                        snapshot_id, version
                    ))
                })
            }
            None => Ok(0),
        }
    }

    /// Flush the WAL before shutdown
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}
