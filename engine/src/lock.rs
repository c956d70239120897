//! Distributed bid lock and per-user cooldown, backed by Redis `SET NX`
//! keys.

use redis::AsyncCommands;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct DistributedLock {
    client: redis::Client,
}

/// A held lock lease. Dropping this without calling `release` leaves the
/// lease to expire naturally after its TTL.
pub struct LockGuard {
    key: String,
    token: String,
}

impl DistributedLock {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Acquires `bid-lock:{user_id}:{auction_id}` with a `lease_ms` lease.
    /// Returns `None` if the lock is already held.
    pub async fn acquire(
        &self,
        name: &str,
        token: &str,
        lease_ms: u64,
    ) -> anyhow::Result<Option<LockGuard>> {
        let key = format!("lock:{name}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let acquired: bool = conn
            .set_options(
                &key,
                token,
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::PX(lease_ms as usize))
                    .conditional_set(redis::ExistenceCheck::NX),
            )
            .await?;
        Ok(acquired.then(|| LockGuard {
            key,
            token: token.to_string(),
        }))
    }

    /// Check-and-delete release: only releases if the lease is still held
    /// by `token`, avoiding releasing a lease acquired by someone else after
    /// this one expired.
    pub async fn release(&self, guard: LockGuard) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&guard.key)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// `SET cooldown:{name} 1 PX cooldown_ms NX`; a pre-existing key means
    /// the caller must reject immediately.
    pub async fn try_set_cooldown(&self, name: &str, cooldown_ms: u64) -> anyhow::Result<bool> {
        let key = format!("cooldown:{name}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let set: bool = conn
            .set_options(
                &key,
                1,
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::PX(cooldown_ms as usize))
                    .conditional_set(redis::ExistenceCheck::NX),
            )
            .await?;
        Ok(set)
    }

    pub async fn is_on_cooldown(&self, name: &str) -> anyhow::Result<bool> {
        let key = format!("cooldown:{name}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }
}
