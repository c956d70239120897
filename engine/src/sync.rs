//! Cache Sync Worker: periodically writes back dirty cache entries to the
//! durable store, and supports a forced full-sync ahead of round
//! completion.

use std::sync::Arc;
use std::time::Duration;

use jiff_sqlx::ToSqlx;
use payloads::{AuctionId, AuctionStatus, UserId};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::cache::FastCache;
use crate::leader::LeaderElector;
use crate::store;
use crate::telemetry::log_error;
use crate::time::TimeSource;

pub struct CacheSyncWorker {
    pool: PgPool,
    cache: Arc<FastCache>,
    time_source: TimeSource,
    elector: LeaderElector,
    in_progress: Mutex<std::collections::HashSet<AuctionId>>,
}

impl CacheSyncWorker {
    pub fn new(
        pool: PgPool,
        cache: Arc<FastCache>,
        time_source: TimeSource,
        elector: LeaderElector,
    ) -> Self {
        Self {
            pool,
            cache,
            time_source,
            elector,
            in_progress: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if !matches!(self.elector.is_leader().await, Ok(true)) {
                continue;
            }
            if let Err(e) = self.sync_all_active().await {
                log_error(e);
            }
        }
    }

    async fn sync_all_active(&self) -> anyhow::Result<()> {
        let auctions = store::auction::list_auctions(Some(AuctionStatus::Active), &self.pool).await?;
        for auction in auctions {
            if let Err(e) = self.sync_one(&auction.id).await {
                tracing::error!(auction_id = %auction.id, error = %e, "cache sync failed, will retry next cycle");
            }
        }
        Ok(())
    }

    /// One sync cycle for a single auction. Skips if a sync is already in
    /// progress; on conflict, dirty entries are left
    /// for the next cycle to retry.
    pub async fn sync_one(&self, auction_id: &AuctionId) -> anyhow::Result<()> {
        {
            let mut in_progress = self.in_progress.lock().await;
            if !in_progress.insert(*auction_id) {
                return Ok(());
            }
        }
        let result = self.sync_one_inner(auction_id).await;
        self.in_progress.lock().await.remove(auction_id);
        result
    }

    async fn sync_one_inner(&self, auction_id: &AuctionId) -> anyhow::Result<()> {
        let dirty_users = self.cache.dirty_users(auction_id).await?;
        let dirty_bids = self.cache.dirty_bids(auction_id).await?;
        if dirty_users.is_empty() && dirty_bids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for raw in &dirty_users {
            let Ok(uuid) = raw.parse::<uuid::Uuid>() else { continue };
            let user_id = UserId(uuid);
            let Some((available, frozen)) = self.cache.read_balance(auction_id, &user_id).await? else {
                continue;
            };
            let user = store::user::get_user_for_update_tx(&user_id, &mut tx).await?;
            if user.balance != available || user.frozen_balance != frozen {
                sqlx::query(
                    "UPDATE users SET balance = $1, frozen_balance = $2, version = version + 1 WHERE id = $3",
                )
                .bind(available)
                .bind(frozen)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }
        for raw in &dirty_bids {
            let Ok(uuid) = raw.parse::<uuid::Uuid>() else { continue };
            let user_id = UserId(uuid);
            let Some((amount, created_at_ms, _version)) = self.cache.read_bid(auction_id, &user_id).await? else {
                continue;
            };
            let created_at = jiff::Timestamp::from_millisecond(created_at_ms)?;
            let now = self.time_source.now();
            sqlx::query(
                r#"
                INSERT INTO bids (auction_id, user_id, amount, status, created_at, updated_at, last_processed_at, version)
                VALUES ($1, $2, $3, 'active', $4, $5, $5, 0)
                ON CONFLICT (auction_id, user_id) WHERE status = 'active'
                DO UPDATE SET amount = EXCLUDED.amount, last_processed_at = EXCLUDED.last_processed_at,
                              updated_at = EXCLUDED.updated_at, version = bids.version + 1
                "#,
            )
            .bind(auction_id)
            .bind(user_id)
            .bind(amount)
            .bind(created_at.to_sqlx())
            .bind(now.to_sqlx())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.cache.clear_dirty(auction_id).await?;
        Ok(())
    }

    /// Waits for any in-flight sync to finish (up to 10 short polls), then
    /// runs one final synchronous sync. Called before `completeRound` so
    /// round completion reads the durable store as the source of truth.
    pub async fn full_sync(&self, auction_id: &AuctionId) -> anyhow::Result<()> {
        for _ in 0..10 {
            if !self.in_progress.lock().await.contains(auction_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.sync_one(auction_id).await
    }
}
