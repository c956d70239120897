//! Fast cache: per-auction Redis state that mirrors the durable store
//! closely enough to admit bids without a database round-trip when warm.
//! Always reconcilable from the durable store (`warmup`, and the Cache Sync
//! Worker's periodic write-back in `crate::sync`).

mod admit;

pub use admit::{AdmitOutcome, AtomicAdmitError};

use payloads::{AuctionId, AuctionStatus, UserId, responses::Auction};
use redis::AsyncCommands;

pub const SCORE_AMOUNT_CAP: i64 = 100_000;

fn meta_key(auction_id: &AuctionId) -> String {
    format!("meta:{auction_id}")
}
fn balance_key(auction_id: &AuctionId, user_id: &UserId) -> String {
    format!("balance:{auction_id}:{user_id}")
}
fn bid_key(auction_id: &AuctionId, user_id: &UserId) -> String {
    format!("bid:{auction_id}:{user_id}")
}
fn leaderboard_key(auction_id: &AuctionId) -> String {
    format!("leaderboard:{auction_id}")
}
fn dirty_users_key(auction_id: &AuctionId) -> String {
    format!("dirty-users:{auction_id}")
}
fn dirty_bids_key(auction_id: &AuctionId) -> String {
    format!("dirty-bids:{auction_id}")
}

/// Leaderboard ranking score: higher amount ranks first; ties broken by
/// earlier `createdAt`. Returns `Err` rather than silently mis-ranking an
/// amount that would not fit safely in an `f64`-encoded score.
pub fn encode_score(amount: i64, created_at_ms: i64) -> Result<f64, AtomicAdmitError> {
    if amount >= SCORE_AMOUNT_CAP {
        return Err(AtomicAdmitError::AmountExceedsScoreCap);
    }
    Ok(amount as f64 * 1e13 + (9_999_999_999_999 - created_at_ms) as f64)
}

pub struct FastCache {
    client: redis::Client,
}

impl FastCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn conn(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn admit_bid(
        &self,
        auction_id: &AuctionId,
        user_id: &UserId,
        amount: i64,
        now_ms: i64,
    ) -> anyhow::Result<AdmitOutcome> {
        let mut conn = self.conn().await?;
        admit::admit_bid(&mut conn, auction_id, user_id, amount, now_ms).await
    }

    /// Populates meta, active bids, and positive balances for an auction.
    /// Idempotent: clears the leaderboard first so a re-warm never leaves
    /// stale ranks behind.
    pub async fn warmup(
        &self,
        auction: &Auction,
        current_round_end_time_ms: i64,
        items_in_round: i32,
        bids: &[payloads::responses::Bid],
        balances: &[(UserId, i64, i64)],
    ) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let meta = meta_key(&auction.id);
        let lb = leaderboard_key(&auction.id);

        let _: () = redis::pipe()
            .del(&lb)
            .hset(&meta, "status", format!("{:?}", auction.status).to_lowercase())
            .hset(&meta, "currentRound", auction.current_round)
            .hset(&meta, "roundEndTime", current_round_end_time_ms)
            .hset(&meta, "itemsInRound", items_in_round)
            .hset(&meta, "minBidAmount", auction.bidding_params.min_bid_amount)
            .hset(
                &meta,
                "antiSnipingWindowMs",
                auction.bidding_params.anti_sniping_window_ms,
            )
            .hset(
                &meta,
                "antiSnipingExtensionMs",
                auction.bidding_params.anti_sniping_extension_ms,
            )
            .hset(&meta, "maxExtensions", auction.bidding_params.max_extensions)
            .query_async(&mut conn)
            .await?;

        for (user_id, available, frozen) in balances {
            if *available <= 0 && *frozen <= 0 {
                continue;
            }
            let key = balance_key(&auction.id, user_id);
            let _: () = conn.hset_multiple(&key, &[("available", available), ("frozen", frozen)]).await?;
        }

        for bid in bids {
            let key = bid_key(&auction.id, &bid.user_id);
            let created_at_ms = bid.created_at.as_millisecond();
            let _: () = conn
                .hset_multiple(
                    &key,
                    &[("amount", bid.amount), ("createdAt", created_at_ms), ("version", bid.version as i64)],
                )
                .await?;
            if let Ok(score) = encode_score(bid.amount, created_at_ms) {
                let _: () = conn.zadd(&lb, bid.user_id.to_string(), score).await?;
            }
        }
        Ok(())
    }

    pub async fn update_round_end_time(&self, auction_id: &AuctionId, new_end_ms: i64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(meta_key(auction_id), "roundEndTime", new_end_ms).await?;
        Ok(())
    }

    pub async fn set_status(&self, auction_id: &AuctionId, status: AuctionStatus) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .hset(meta_key(auction_id), "status", format!("{status:?}").to_lowercase())
            .await?;
        Ok(())
    }

    pub async fn dirty_users(&self, auction_id: &AuctionId) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(dirty_users_key(auction_id)).await?)
    }

    pub async fn dirty_bids(&self, auction_id: &AuctionId) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(dirty_bids_key(auction_id)).await?)
    }

    pub async fn clear_dirty(&self, auction_id: &AuctionId) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(dirty_users_key(auction_id)).await?;
        let _: () = conn.del(dirty_bids_key(auction_id)).await?;
        Ok(())
    }

    pub async fn read_balance(&self, auction_id: &AuctionId, user_id: &UserId) -> anyhow::Result<Option<(i64, i64)>> {
        let mut conn = self.conn().await?;
        let values: (Option<i64>, Option<i64>) =
            conn.hget(balance_key(auction_id, user_id), &["available", "frozen"]).await?;
        Ok(match values {
            (Some(a), Some(f)) => Some((a, f)),
            _ => None,
        })
    }

    pub async fn read_bid(&self, auction_id: &AuctionId, user_id: &UserId) -> anyhow::Result<Option<(i64, i64, i64)>> {
        let mut conn = self.conn().await?;
        let values: (Option<i64>, Option<i64>, Option<i64>) = conn
            .hget(bid_key(auction_id, user_id), &["amount", "createdAt", "version"])
            .await?;
        Ok(match values {
            (Some(a), Some(c), Some(v)) => Some((a, c, v)),
            _ => None,
        })
    }

    /// Paginated leaderboard read: (userId, amount) pairs ranked highest
    /// first. Amount is recovered from the companion `bid:{auction}:{user}`
    /// hash since the sorted set only stores the encoded score.
    pub async fn leaderboard(
        &self,
        auction_id: &AuctionId,
        offset: isize,
        limit: isize,
    ) -> anyhow::Result<Vec<UserId>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrevrange(leaderboard_key(auction_id), offset, offset + limit - 1)
            .await?;
        Ok(ids
            .into_iter()
            .filter_map(|s| s.parse::<uuid::Uuid>().ok().map(UserId))
            .collect())
    }

    /// Tears down all keys for an auction on round/auction completion.
    pub async fn teardown(&self, auction_id: &AuctionId) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(&[
                meta_key(auction_id),
                leaderboard_key(auction_id),
                dirty_users_key(auction_id),
                dirty_bids_key(auction_id),
            ])
            .await?;
        Ok(())
    }
}
