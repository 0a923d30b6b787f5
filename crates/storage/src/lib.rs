use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// The anonymous device identity used to meter guest usage. Created at most
/// once per device profile; the id itself is issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub temp_user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: Option<DateTime<Utc>>,
}

pub trait IdentityStore: Send + Sync {
    async fn load_identity(&self, profile: &str) -> Result<Option<StoredIdentity>>;
    async fn save_identity(&self, profile: &str, identity: &StoredIdentity) -> Result<()>;
    async fn clear_identity(&self, profile: &str) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct MemoryIdentityStore {
    identities: Arc<RwLock<HashMap<String, StoredIdentity>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    async fn load_identity(&self, profile: &str) -> Result<Option<StoredIdentity>> {
        Ok(self.identities.read().get(profile).cloned())
    }

    async fn save_identity(&self, profile: &str, identity: &StoredIdentity) -> Result<()> {
        self.identities
            .write()
            .insert(profile.to_string(), identity.clone());
        Ok(())
    }

    async fn clear_identity(&self, profile: &str) -> Result<()> {
        self.identities.write().remove(profile);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

impl SqliteIdentityStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
              profile TEXT PRIMARY KEY,
              temp_user_id TEXT NOT NULL,
              created_at TEXT NOT NULL,
              last_validated_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl IdentityStore for SqliteIdentityStore {
    async fn load_identity(&self, profile: &str) -> Result<Option<StoredIdentity>> {
        let row = sqlx::query(
            r#"
            SELECT temp_user_id, created_at, last_validated_at
            FROM identities
            WHERE profile = ?1
            "#,
        )
        .bind(profile)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let identity = StoredIdentity {
            temp_user_id: row.get("temp_user_id"),
            created_at: row
                .get::<String, _>("created_at")
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            last_validated_at: row
                .get::<Option<String>, _>("last_validated_at")
                .and_then(|value| value.parse().ok()),
        };

        Ok(Some(identity))
    }

    async fn save_identity(&self, profile: &str, identity: &StoredIdentity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identities (profile, temp_user_id, created_at, last_validated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(profile) DO UPDATE SET
              temp_user_id=excluded.temp_user_id,
              created_at=excluded.created_at,
              last_validated_at=excluded.last_validated_at
            "#,
        )
        .bind(profile)
        .bind(&identity.temp_user_id)
        .bind(identity.created_at.to_rfc3339())
        .bind(identity.last_validated_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_identity(&self, profile: &str) -> Result<()> {
        sqlx::query("DELETE FROM identities WHERE profile = ?1")
            .bind(profile)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryIdentityStore),
    Sqlite(SqliteIdentityStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryIdentityStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteIdentityStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }
}

impl IdentityStore for Store {
    async fn load_identity(&self, profile: &str) -> Result<Option<StoredIdentity>> {
        match self {
            Store::Memory(store) => store.load_identity(profile).await,
            Store::Sqlite(store) => store.load_identity(profile).await,
        }
    }

    async fn save_identity(&self, profile: &str, identity: &StoredIdentity) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_identity(profile, identity).await,
            Store::Sqlite(store) => store.save_identity(profile, identity).await,
        }
    }

    async fn clear_identity(&self, profile: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.clear_identity(profile).await,
            Store::Sqlite(store) => store.clear_identity(profile).await,
        }
    }
}
