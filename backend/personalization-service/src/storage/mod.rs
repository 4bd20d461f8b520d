// ============================================
// Local Persistent Store
// ============================================
//
// String-keyed, string-valued durable storage shared by every component of a
// session. Blobs are JSON with an explicit schema version; anything missing,
// malformed or written by a newer schema is treated as absent.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryLocalStore;
pub use redis_store::RedisLocalStore;

use crate::error::Result;
use crate::models::SCHEMA_VERSION;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Fixed keys used by the personalization core
pub mod keys {
    pub const BEHAVIOR: &str = "behavior";
    pub const RECOMMENDATIONS: &str = "recommendations";
    pub const CLASSIFIER_SNAPSHOT: &str = "classifier-state-snapshot";
    pub const SYSTEM_STATE: &str = "system-state";
    pub const PRODUCTS: &str = "products";
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Total bytes currently held by this store
    async fn usage_bytes(&self) -> Result<u64>;
}

/// Blobs that carry a schema version
pub trait Versioned {
    fn schema_version(&self) -> u32;
}

impl Versioned for crate::models::BehaviorRecord {
    fn schema_version(&self) -> u32 {
        self.version
    }
}

impl Versioned for crate::models::SystemState {
    fn schema_version(&self) -> u32 {
        self.version
    }
}

impl Versioned for crate::models::RecommendationSlate {
    fn schema_version(&self) -> u32 {
        self.version
    }
}

/// Load a JSON blob, treating every failure as absence
pub async fn load_json<T>(store: &dyn LocalStore, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key = key, error = %e, "Local store read failed, using defaults");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = key, error = %e, "Malformed blob in local store, ignoring");
            None
        }
    }
}

/// Load a versioned blob; blobs from a newer schema are rejected
pub async fn load_versioned<T>(store: &dyn LocalStore, key: &str) -> Option<T>
where
    T: DeserializeOwned + Versioned,
{
    let value: T = load_json(store, key).await?;
    if value.schema_version() > SCHEMA_VERSION {
        warn!(
            key = key,
            found = value.schema_version(),
            supported = SCHEMA_VERSION,
            "Unsupported schema version in local store, ignoring"
        );
        return None;
    }
    Some(value)
}

pub async fn save_json<T>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value)?;
    store.set(key, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BehaviorRecord, ModelTier, SystemState};

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let store = MemoryLocalStore::new();
        let loaded: Option<BehaviorRecord> = load_versioned(&store, keys::BEHAVIOR).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_malformed_blob_is_absent() {
        let store = MemoryLocalStore::new();
        store.set(keys::BEHAVIOR, "{not json").await.unwrap();

        let loaded: Option<BehaviorRecord> = load_versioned(&store, keys::BEHAVIOR).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_absent() {
        let store = MemoryLocalStore::new();
        store
            .set(keys::SYSTEM_STATE, r#"{"tier": "gigantic"}"#)
            .await
            .unwrap();

        let loaded: Option<SystemState> = load_versioned(&store, keys::SYSTEM_STATE).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let store = MemoryLocalStore::new();
        store
            .set(keys::BEHAVIOR, r#"{"version": 99, "productViews": {"P1": 1}}"#)
            .await
            .unwrap();

        let loaded: Option<BehaviorRecord> = load_versioned(&store, keys::BEHAVIOR).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryLocalStore::new();
        let state = SystemState::new(ModelTier::Normal, chrono::Utc::now(), 0.8);

        save_json(&store, keys::SYSTEM_STATE, &state).await.unwrap();
        let loaded: SystemState = load_versioned(&store, keys::SYSTEM_STATE).await.unwrap();

        assert_eq!(loaded.tier, ModelTier::Normal);
    }
}
