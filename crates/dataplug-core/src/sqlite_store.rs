//! SQLite storage backend
//!
//! The default durable backend for Dataplug. One handle backs all three
//! storage traits: conversations (versioned compare-and-set writes),
//! purchases and the append-only audit/error logs.

use crate::audit::{AuditEntry, ErrorEntry};
use crate::error::{Error, Result};
use crate::purchase::{Purchase, PurchaseStatus};
use crate::store::{AuditStore, ConversationRecord, PurchaseStore, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database at the given path
    ///
    /// # Errors
    ///
    /// Returns `PersistenceUnavailable` if the database cannot be opened
    /// or the schema cannot be created.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::PersistenceUnavailable(format!("failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::PersistenceUnavailable(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::PersistenceUnavailable(format!("failed to connect to SQLite: {e}"))
            })?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<()> {
        for ddl in [
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                phone TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                temp_data TEXT NOT NULL,
                version INTEGER NOT NULL,
                last_updated TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS purchases (
                id TEXT PRIMARY KEY,
                phone TEXT NOT NULL,
                user_phone_input TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                plan_title TEXT NOT NULL,
                network TEXT,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                payment_provider TEXT NOT NULL,
                payment_reference TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_purchases_reference
                ON purchases(payment_reference)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS error_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT,
                location TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(|e| {
                Error::PersistenceUnavailable(format!("failed to create schema: {e}"))
            })?;
        }

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Probe database connectivity
    ///
    /// Used by the health endpoint instead of a cached connected flag.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::PersistenceUnavailable(format!("health check failed: {e}")))?;
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("bad timestamp in store: {e}")))
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self, phone: &str) -> Result<ConversationRecord> {
        let row: Option<(String, String, i64, String)> = sqlx::query_as(
            "SELECT state, temp_data, version, last_updated FROM conversations WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to load conversation: {e}")))?;

        match row {
            Some((state, temp_data, version, last_updated)) => Ok(ConversationRecord {
                phone: phone.to_string(),
                state: state.parse()?,
                temp_data: serde_json::from_str(&temp_data)
                    .map_err(|e| Error::Internal(format!("bad temp_data in store: {e}")))?,
                version,
                last_updated: Self::parse_timestamp(&last_updated)?,
            }),
            None => Ok(ConversationRecord::new(phone)),
        }
    }

    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        let temp_data = serde_json::to_string(&record.temp_data)
            .map_err(|e| Error::Internal(format!("failed to serialize temp_data: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let result = if record.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO conversations (phone, state, temp_data, version, last_updated)
                VALUES (?, ?, ?, 1, ?)
                ON CONFLICT(phone) DO NOTHING
                "#,
            )
            .bind(&record.phone)
            .bind(record.state.as_str())
            .bind(&temp_data)
            .bind(&now)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE conversations
                SET state = ?, temp_data = ?, version = version + 1, last_updated = ?
                WHERE phone = ? AND version = ?
                "#,
            )
            .bind(record.state.as_str())
            .bind(&temp_data)
            .bind(&now)
            .bind(&record.phone)
            .bind(record.version)
            .execute(&self.pool)
            .await
        };

        let result = result.map_err(|e| {
            Error::PersistenceUnavailable(format!("failed to save conversation: {e}"))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::ConcurrentStateConflict(record.phone.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for SqliteStore {
    async fn insert(&self, purchase: &Purchase) -> Result<()> {
        let metadata = serde_json::to_string(&purchase.metadata)
            .map_err(|e| Error::Internal(format!("failed to serialize metadata: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, phone, user_phone_input, plan_id, plan_title, network,
                amount, currency, payment_provider, payment_reference,
                status, metadata, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(purchase.id.to_string())
        .bind(&purchase.phone)
        .bind(&purchase.user_phone_input)
        .bind(&purchase.plan_id)
        .bind(&purchase.plan_title)
        .bind(&purchase.network)
        .bind(i64::from(purchase.amount))
        .bind(&purchase.currency)
        .bind(&purchase.payment_provider)
        .bind(&purchase.payment_reference)
        .bind(purchase.status.as_str())
        .bind(&metadata)
        .bind(purchase.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to insert purchase: {e}")))?;

        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Purchase>> {
        type PurchaseRow = (
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            i64,
            String,
            String,
            String,
            String,
            String,
            String,
        );
        let row: Option<PurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, phone, user_phone_input, plan_id, plan_title, network,
                   amount, currency, payment_provider, payment_reference,
                   status, metadata, created_at
            FROM purchases WHERE payment_reference = ?
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to load purchase: {e}")))?;

        let Some((
            id,
            phone,
            user_phone_input,
            plan_id,
            plan_title,
            network,
            amount,
            currency,
            payment_provider,
            payment_reference,
            status,
            metadata,
            created_at,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(Purchase {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::Internal(format!("bad purchase id in store: {e}")))?,
            phone,
            user_phone_input,
            plan_id,
            plan_title,
            network,
            amount: u32::try_from(amount)
                .map_err(|e| Error::Internal(format!("bad amount in store: {e}")))?,
            currency,
            payment_provider,
            payment_reference,
            status: status.parse()?,
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| Error::Internal(format!("bad metadata in store: {e}")))?,
            created_at: Self::parse_timestamp(&created_at)?,
        }))
    }

    async fn update_status(&self, reference: &str, status: PurchaseStatus) -> Result<bool> {
        // Conditional on the row still being pending: two racing
        // settlements resolve here, not in application code.
        let result = sqlx::query(
            "UPDATE purchases SET status = ? WHERE payment_reference = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(reference)
        .bind(PurchaseStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to update purchase: {e}")))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // No pending row matched: either already settled or missing.
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM purchases WHERE payment_reference = ?")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::PersistenceUnavailable(format!("failed to load purchase: {e}"))
                })?;
        match exists {
            Some(_) => Ok(false),
            None => Err(Error::PurchaseNotFound(reference.to_string())),
        }
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)
            .map_err(|e| Error::Internal(format!("failed to serialize payload: {e}")))?;

        sqlx::query(
            "INSERT INTO audit_log (phone, kind, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.phone)
        .bind(&entry.kind)
        .bind(&payload)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to append audit: {e}")))?;

        Ok(())
    }

    async fn append_error(&self, entry: &ErrorEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO error_log (phone, location, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.phone)
        .bind(&entry.location)
        .bind(&entry.message)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("failed to append error: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::engine::ConversationState;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_conversation_round_trip() {
        let (store, _dir) = temp_store().await;

        let mut record = store.load("2347063255405").await.unwrap();
        assert_eq!(record.version, 0);

        record.state = ConversationState::AwaitingPaymentConfirmation;
        record.temp_data.plan_id = Some("1gb_379".into());
        store.save(&record).await.unwrap();

        let reloaded = store.load("2347063255405").await.unwrap();
        assert_eq!(reloaded.state, ConversationState::AwaitingPaymentConfirmation);
        assert_eq!(reloaded.temp_data.plan_id.as_deref(), Some("1gb_379"));
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_loses() {
        let (store, _dir) = temp_store().await;

        let first = store.load("234111").await.unwrap();
        let second = first.clone();
        store.save(&first).await.unwrap();

        let err = store.save(&second).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrentStateConflict(_)));
    }

    #[tokio::test]
    async fn test_purchase_round_trip() {
        let (store, _dir) = temp_store().await;

        let plan = catalog::find("500mb_299").unwrap();
        let purchase = Purchase::pending("234111", None, plan, "callback");
        store.insert(&purchase).await.unwrap();

        let loaded = store
            .find_by_reference(&purchase.payment_reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.amount, 299);
        assert_eq!(loaded.status, PurchaseStatus::Pending);
        assert_eq!(loaded.id, purchase.id);

        assert!(store
            .update_status(&purchase.payment_reference, PurchaseStatus::Paid)
            .await
            .unwrap());
        let loaded = store
            .find_by_reference(&purchase.payment_reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, PurchaseStatus::Paid);

        // Once settled, a conflicting write is refused, not applied.
        assert!(!store
            .update_status(&purchase.payment_reference, PurchaseStatus::Failed)
            .await
            .unwrap());
        let loaded = store
            .find_by_reference(&purchase.payment_reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, PurchaseStatus::Paid);

        let err = store
            .update_status("DP-missing", PurchaseStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PurchaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_audit_and_error_appends() {
        let (store, _dir) = temp_store().await;

        let audit = AuditEntry {
            phone: "234111".into(),
            kind: "state_transition".into(),
            payload: serde_json::json!({"to": "done"}),
            created_at: Utc::now(),
        };
        store.append_audit(&audit).await.unwrap();

        let error = ErrorEntry {
            phone: None,
            location: "gateway.send".into(),
            message: "timeout".into(),
            created_at: Utc::now(),
        };
        store.append_error(&error).await.unwrap();

        store.health_check().await.unwrap();
    }
}
