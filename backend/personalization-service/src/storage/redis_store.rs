use super::LocalStore;
use crate::error::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

/// Redis-backed store; every key lives under `{prefix}:{user_id}:`
pub struct RedisLocalStore {
    redis: redis::Client,
    namespace: String,
}

impl RedisLocalStore {
    pub fn new(redis: redis::Client, prefix: &str, user_id: &str) -> Self {
        Self {
            redis,
            namespace: format!("{}:{}", prefix, user_id),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl LocalStore for RedisLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.set(self.key(key), value).await?;
        debug!(key = key, bytes = value.len(), "Wrote local store entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }

    async fn usage_bytes(&self) -> Result<u64> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{}:*", self.namespace)).await?;

        let mut total = 0u64;
        for key in keys {
            let len: u64 = conn.strlen(&key).await?;
            total += len + key.len() as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespacing() {
        let client = redis::Client::open("redis://localhost:6379").unwrap();
        let store = RedisLocalStore::new(client, "personalization", "user-1");

        assert_eq!(store.key("behavior"), "personalization:user-1:behavior");
    }

    #[tokio::test]
    async fn test_roundtrip_against_live_redis() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = match redis::Client::open(redis_url.clone()) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(_) => client,
                Err(_) => {
                    println!("Skipping: cannot connect to Redis ({})", redis_url);
                    return;
                }
            },
            Err(_) => return,
        };

        let user = uuid::Uuid::new_v4().to_string();
        let store = RedisLocalStore::new(client, "personalization-test", &user);

        store.set("behavior", "{}").await.unwrap();
        assert_eq!(store.get("behavior").await.unwrap().as_deref(), Some("{}"));
        assert!(store.usage_bytes().await.unwrap() > 0);

        store.remove("behavior").await.unwrap();
        assert!(store.get("behavior").await.unwrap().is_none());
    }
}
