use crate::storage_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use ridepool_core::CoreResult;
use ridepool_wizard::{SessionStore, WizardSession};
use tracing::debug;

/// Wizard sessions as JSON strings that expire on their own after the TTL.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
    ttl_seconds: u64,
}

// Overwrites KEYS[1] only if the stored session has id ARGV[1] and seq ARGV[2].
const SAVE_IF_SEQ: &str = r#"
    local raw = redis.call("GET", KEYS[1])
    if not raw then
        return 0
    end
    local stored = cjson.decode(raw)
    if stored.id ~= ARGV[1] or tonumber(stored.seq) ~= tonumber(ARGV[2]) then
        return 0
    end
    redis.call("SET", KEYS[1], ARGV[3], "EX", ARGV[4])
    return 1
"#;

impl RedisSessionStore {
    pub fn new(connection_string: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, ttl_seconds })
    }

    fn key(user_key: &str) -> String {
        format!("wizard:session:{}", user_key)
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(storage_err)
    }

    pub async fn ping(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, user_key: &str) -> CoreResult<Option<WizardSession>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(Self::key(user_key)).await.map_err(storage_err)?;
        raw.map(|json| serde_json::from_str(&json).map_err(storage_err))
            .transpose()
    }

    async fn create(&self, session: &WizardSession) -> CoreResult<()> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(session).map_err(storage_err)?;
        conn.set_ex::<_, _, ()>(Self::key(&session.user_key), json, self.ttl_seconds)
            .await
            .map_err(storage_err)?;
        debug!("Wizard session {} stored for {}", session.id, session.user_key);
        Ok(())
    }

    async fn save_if_seq(&self, session: &WizardSession, expected_seq: u64) -> CoreResult<bool> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(session).map_err(storage_err)?;
        let script = redis::Script::new(SAVE_IF_SEQ);
        let swapped: i32 = script
            .key(Self::key(&session.user_key))
            .arg(session.id.to_string())
            .arg(expected_seq)
            .arg(json)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(swapped == 1)
    }

    async fn delete(&self, user_key: &str) -> CoreResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::key(user_key)).await.map_err(storage_err)?;
        Ok(())
    }

    async fn purge_idle(&self, _cutoff: DateTime<Utc>) -> CoreResult<usize> {
        // Redis expires idle keys itself.
        Ok(0)
    }
}
