//! Redis-backed leader election shared by the Timer Driver, the Round
//! Expiry Scheduler, and the Cache Sync Worker. Exactly one process in the
//! cluster holds the lease at a time; everyone else no-ops.

use redis::AsyncCommands;

/// One elected leader lease, identified by `key` (e.g. `"leader:timer"`,
/// `"leader:scheduler"`). `instance_id` should be stable for the lifetime of
/// the process (a random uuid generated at startup is sufficient).
pub struct LeaderElector {
    client: redis::Client,
    key: String,
    instance_id: String,
    ttl_sec: u64,
}

impl LeaderElector {
    pub fn new(client: redis::Client, key: impl Into<String>, instance_id: String, ttl_sec: u64) -> Self {
        Self {
            client,
            key: key.into(),
            instance_id,
            ttl_sec,
        }
    }

    /// Attempts to acquire or extend leadership. Returns whether this
    /// instance is the leader after the call.
    pub async fn try_become_leader(&self) -> anyhow::Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let acquired: bool = conn
            .set_options(
                &self.key,
                &self.instance_id,
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::EX(self.ttl_sec))
                    .conditional_set(redis::ExistenceCheck::NX),
            )
            .await?;
        if acquired {
            return Ok(true);
        }
        // Already leader? extend the lease.
        let held_by: Option<String> = conn.get(&self.key).await?;
        if held_by.as_deref() == Some(self.instance_id.as_str()) {
            let _: () = conn.expire(&self.key, self.ttl_sec as i64).await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn is_leader(&self) -> anyhow::Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let held_by: Option<String> = conn.get(&self.key).await?;
        Ok(held_by.as_deref() == Some(self.instance_id.as_str()))
    }
}
