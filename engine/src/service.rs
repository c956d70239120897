//! Auction Service: orchestrates the durable store, fast cache, distributed
//! lock, timer driver, cache sync worker, and notification outbox behind
//! the auction lifecycle and bidding operations. Route handlers are thin
//! wrappers around this type.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use payloads::{
    AuctionId, AuctionStatus, UserId,
    requests::CreateAuction,
    responses::{Auction, AuditReport, Bid, FastBidResult, LeaderboardEntry, LeaderboardResponse, PlaceBidResult},
};
use rand::Rng;
use sqlx::PgPool;

use crate::cache::FastCache;
use crate::config::BiddingConfig;
use crate::events::{AuctionEvent, EventBus};
use crate::lock::DistributedLock;
use crate::outbox::{Notification, Notifier};
use crate::store::{self, StoreError};
use crate::sync::CacheSyncWorker;
use crate::time::TimeSource;
use crate::timer::TimerDriver;

pub struct AuctionService {
    pub pool: PgPool,
    pub cache: Arc<FastCache>,
    pub lock: Arc<DistributedLock>,
    pub timer: Arc<TimerDriver>,
    pub sync_worker: Arc<CacheSyncWorker>,
    pub notifier: Arc<dyn Notifier>,
    pub events: EventBus,
    pub time_source: TimeSource,
    pub bidding: BiddingConfig,
}

impl AuctionService {
    pub async fn create_auction(&self, req: CreateAuction) -> Result<Auction, StoreError> {
        store::auction::create_auction(req, &self.time_source, &self.pool).await
    }

    pub async fn get_auction(&self, id: &AuctionId) -> Result<Auction, StoreError> {
        store::auction::get_auction(id, &self.pool).await
    }

    pub async fn list_auctions(&self, status: Option<AuctionStatus>) -> Result<Vec<Auction>, StoreError> {
        store::auction::list_auctions(status, &self.pool).await
    }

    /// CAS pending -> active, arm round 1, warm the cache, and emit
    /// the corresponding events plus an armed timer.
    pub async fn start_auction(&self, id: &AuctionId) -> Result<Auction, StoreError> {
        let auction = store::auction::start_auction(id, &self.time_source, &self.pool).await?;
        let round = store::round::get_auction_round(id, 1, &self.pool).await?;

        self.events.publish(AuctionEvent::AuctionUpdated { auction_id: *id });
        self.events.publish(AuctionEvent::RoundStarted {
            auction_id: *id,
            round_number: 1,
        });
        self.timer.start(*id, 1, round.end_time.as_millisecond()).await;
        self.spawn_warmup(*id);
        Ok(auction)
    }

    fn spawn_warmup(&self, auction_id: AuctionId) {
        let pool = self.pool.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if let Err(e) = warmup_auction(&pool, &cache, &auction_id).await {
                tracing::error!(%auction_id, error = %e, "cache warmup failed");
            }
        });
    }

    fn lock_name(auction_id: &AuctionId, user_id: &UserId) -> String {
        format!("{user_id}:{auction_id}")
    }

    fn cooldown_name(auction_id: &AuctionId, user_id: &UserId) -> String {
        format!("{user_id}:{auction_id}")
    }

    fn bypasses_lock(&self, client_ip: Option<IpAddr>) -> bool {
        client_ip.is_some_and(|ip| self.bidding.loopback_allowlist.contains(&ip))
    }

    /// The standard (slow) bid path: distributed lock, cooldown,
    /// retry-on-conflict around the durable transaction, then post-commit
    /// notifications and timer updates.
    pub async fn place_bid(
        &self,
        auction_id: &AuctionId,
        user_id: &UserId,
        amount: i64,
        client_ip: Option<IpAddr>,
    ) -> Result<PlaceBidResult, StoreError> {
        let bypass = self.bypasses_lock(client_ip);
        let lock_name = Self::lock_name(auction_id, user_id);
        let cooldown_name = Self::cooldown_name(auction_id, user_id);

        let guard = if bypass {
            None
        } else {
            if self.lock.is_on_cooldown(&cooldown_name).await.unwrap_or(false) {
                return Err(StoreError::Conflict("bidding too quickly, try again shortly".into()));
            }
            match self
                .lock
                .acquire(&lock_name, &user_id.to_string(), self.bidding.lock_lease_ms)
                .await
            {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => return Err(StoreError::Conflict("another bid from this user is in flight".into())),
                Err(e) => return Err(StoreError::Internal(e)),
            }
        };

        let result = self.place_bid_with_retry(auction_id, user_id, amount).await;

        if !bypass {
            if let Some(guard) = guard {
                let _ = self.lock.release(guard).await;
            }
            let _ = self.lock.try_set_cooldown(&cooldown_name, self.bidding.cooldown_ms).await;
        }

        let outcome = result?;
        self.post_bid_effects(auction_id, user_id, &outcome).await;

        Ok(PlaceBidResult {
            bid: outcome.bid,
            auction: outcome.auction,
        })
    }

    /// Post-commit follow-up shared by both bid paths: publish the
    /// `BidPlaced` event, update the timer and de-duplicate/enqueue an
    /// anti-sniping notification if this bid triggered a round extension,
    /// and notify outbid users.
    async fn post_bid_effects(
        &self,
        auction_id: &AuctionId,
        user_id: &UserId,
        outcome: &store::bid::PlaceBidOutcome,
    ) {
        self.events.publish(AuctionEvent::BidPlaced {
            auction_id: *auction_id,
            bid_id: outcome.bid.id,
            user_id: *user_id,
            amount: outcome.bid.amount,
        });
        if let Some(new_end) = outcome.new_round_end_time {
            self.timer.update(auction_id, new_end.as_millisecond()).await;
            self.events.publish(AuctionEvent::AuctionUpdated { auction_id: *auction_id });
        }
        if outcome.anti_sniping_triggered {
            self.notify_anti_sniping_extension(auction_id, outcome).await;
        }
        self.notify_outbid_users(auction_id, &outcome.outbid_user_ids, outcome.bid.amount)
            .await;
    }

    /// CAS-dedupes the extension notification against
    /// `lastNotifiedExtensionCount` so a retried or concurrently-completed
    /// bid never double-notifies for the same extension.
    async fn notify_anti_sniping_extension(&self, auction_id: &AuctionId, outcome: &store::bid::PlaceBidOutcome) {
        let Some(new_end) = outcome.new_round_end_time else { return };
        let notified = store::round::mark_extension_notified(&outcome.round_id, &self.pool)
            .await
            .unwrap_or(false);
        if notified {
            self.notifier
                .notify(Notification::AntiSnipingExtended {
                    auction_id: *auction_id,
                    round_number: outcome.round_number,
                    new_end_time_ms: new_end.as_millisecond(),
                })
                .await;
        }
    }

    async fn place_bid_with_retry(
        &self,
        auction_id: &AuctionId,
        user_id: &UserId,
        amount: i64,
    ) -> Result<store::bid::PlaceBidOutcome, StoreError> {
        let mut attempt = 0u32;
        loop {
            match store::bid::place_bid_attempt(
                auction_id,
                user_id,
                amount,
                &self.time_source,
                self.bidding.boundary_buffer_ms,
                &self.pool,
            )
            .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(StoreError::Conflict(_)) if attempt < self.bidding.max_bid_retries => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0..self.bidding.retry_base_ms.max(1));
                    let backoff_ms = self.bidding.retry_base_ms * attempt as u64 + jitter;
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort outbid notification: skips users whose active bid can't
    /// be found (already superseded again) and relies on the
    /// `outbid_notified_at` CAS for at-most-once delivery.
    async fn notify_outbid_users(&self, auction_id: &AuctionId, outbid: &[UserId], new_amount: i64) {
        for user_id in outbid {
            let Ok(Some(bid)) = self.active_bid_for(auction_id, user_id).await else {
                continue;
            };
            let notified = store::bid::mark_outbid_notified(&bid.id, &self.time_source, &self.pool)
                .await
                .unwrap_or(false);
            if notified {
                self.notifier
                    .notify(Notification::Outbid {
                        user_id: *user_id,
                        auction_id: *auction_id,
                        bid_id: bid.id,
                        outbid_by_amount: new_amount,
                    })
                    .await;
            }
        }
    }

    async fn active_bid_for(&self, auction_id: &AuctionId, user_id: &UserId) -> Result<Option<Bid>, StoreError> {
        let bids = store::bid::list_bids_for_user(auction_id, user_id, &self.pool).await?;
        Ok(bids.into_iter().find(|b| b.status == payloads::BidStatus::Active))
    }

    /// The fast (cache-only) bid path. Falls back to the slow path
    /// transparently when the cache reports not-warm for the auction or the
    /// user.
    pub async fn fast_bid(
        &self,
        auction_id: &AuctionId,
        user_id: &UserId,
        amount: i64,
        client_ip: Option<IpAddr>,
    ) -> Result<FastBidResult, StoreError> {
        let now_ms = self.time_source.now().as_millisecond();
        let outcome = match self.cache.admit_bid(auction_id, user_id, amount, now_ms).await {
            Ok(outcome) => outcome,
            // Amount is outside the fast path's leaderboard score encoding
            // range; the durable store has no such limit, so fall back.
            Err(e) if e.downcast_ref::<crate::cache::AtomicAdmitError>().is_some() => {
                let result = self.place_bid(auction_id, user_id, amount, client_ip).await?;
                return Ok(FastBidResult {
                    status: payloads::AdmitStatus::Ok,
                    amount: result.bid.amount,
                    rank: None,
                });
            }
            Err(e) => return Err(StoreError::Internal(e)),
        };

        match outcome.status {
            payloads::AdmitStatus::NotWarmed | payloads::AdmitStatus::UserNotWarmed => {
                let result = self.place_bid(auction_id, user_id, amount, client_ip).await?;
                return Ok(FastBidResult {
                    status: payloads::AdmitStatus::Ok,
                    amount: result.bid.amount,
                    rank: None,
                });
            }
            payloads::AdmitStatus::Ok => {}
            other => {
                return Ok(FastBidResult {
                    status: other,
                    amount,
                    rank: None,
                });
            }
        }

        let rank = self
            .cache
            .leaderboard(auction_id, 0, 1000)
            .await
            .ok()
            .and_then(|ids| ids.iter().position(|id| id == user_id))
            .map(|pos| pos as i64 + 1);

        self.spawn_fast_bid_reconcile(*auction_id, *user_id, outcome.new_amount);

        Ok(FastBidResult {
            status: payloads::AdmitStatus::Ok,
            amount: outcome.new_amount,
            rank,
        })
    }

    /// Runs the durable-store anti-sniping and outbid checks for a bid that
    /// was admitted through the cache, and emits the same `BidPlaced` event
    /// the slow path emits. Spawned fire-and-forget so the fast path stays
    /// cache-only on the request's critical section; `full_sync` flushes the
    /// cache's admit into Postgres first so the checks below see it.
    fn spawn_fast_bid_reconcile(&self, auction_id: AuctionId, user_id: UserId, amount: i64) {
        let pool = self.pool.clone();
        let sync_worker = self.sync_worker.clone();
        let timer = self.timer.clone();
        let notifier = self.notifier.clone();
        let events = self.events.clone();
        let time_source = self.time_source.clone();
        tokio::spawn(async move {
            if let Err(e) = reconcile_fast_bid(
                &pool,
                &sync_worker,
                &timer,
                notifier.as_ref(),
                &events,
                &time_source,
                &auction_id,
                &user_id,
                amount,
            )
            .await
            {
                tracing::error!(%auction_id, %user_id, error = %e, "fast-bid reconciliation failed");
            }
        });
    }

    /// Completes the current round if it has ended. No-op if it hasn't, or
    /// if someone else already completed it: `complete_round_tx`
    /// is CAS-guarded so concurrent callers (the scheduler, a retried
    /// client) never double-process a round.
    pub async fn complete_round(&self, auction_id: &AuctionId) -> Result<(), StoreError> {
        self.sync_worker
            .full_sync(auction_id)
            .await
            .map_err(StoreError::Internal)?;

        let Some(outcome) = store::round::complete_round_tx(auction_id, &self.time_source, &self.pool).await?
        else {
            return Ok(());
        };

        self.events.publish(AuctionEvent::RoundCompleted {
            auction_id: *auction_id,
            round_number: outcome.completed_round.round_number,
        });

        for bid in &outcome.winners {
            self.notifier
                .notify(Notification::RoundWin {
                    user_id: bid.user_id,
                    auction_id: *auction_id,
                    bid_id: bid.id,
                    item_number: bid.item_number.unwrap_or_default(),
                })
                .await;
        }
        for bid in &outcome.losers {
            self.notifier
                .notify(Notification::RoundLoss {
                    user_id: bid.user_id,
                    auction_id: *auction_id,
                    bid_id: bid.id,
                })
                .await;
        }

        if outcome.auction_completed {
            self.timer.stop(auction_id).await;
            let _ = self.cache.teardown(auction_id).await;
            self.events.publish(AuctionEvent::AuctionCompleted { auction_id: *auction_id });
            self.notifier
                .notify(Notification::AuctionComplete { auction_id: *auction_id })
                .await;
        } else if let Some(next_round) = outcome.next_round {
            let _ = self.cache.teardown(auction_id).await;
            self.spawn_warmup(*auction_id);
            self.timer
                .start(*auction_id, next_round.round_number, next_round.end_time.as_millisecond())
                .await;
            self.events.publish(AuctionEvent::RoundStarted {
                auction_id: *auction_id,
                round_number: next_round.round_number,
            });
            self.notifier
                .notify(Notification::NewRound {
                    auction_id: *auction_id,
                    round_number: next_round.round_number,
                })
                .await;
        }

        Ok(())
    }

    pub async fn leaderboard(
        &self,
        auction_id: &AuctionId,
        limit: i64,
        offset: i64,
    ) -> Result<LeaderboardResponse, StoreError> {
        let auction = self.get_auction(auction_id).await?;
        let items_in_round = if auction.current_round > 0 {
            store::round::get_auction_round(auction_id, auction.current_round, &self.pool)
                .await
                .map(|r| r.items_count)
                .unwrap_or(0)
        } else {
            0
        };

        let bids = store::bid::list_active_bids_page(auction_id, limit, offset, &self.pool).await?;
        let active = bids
            .into_iter()
            .enumerate()
            .map(|(i, bid)| LeaderboardEntry {
                user_id: bid.user_id,
                amount: bid.amount,
                created_at: bid.created_at,
                is_winning: (i as i64 + offset) < items_in_round as i64,
            })
            .collect();

        let past_winners = store::bid::list_past_winners(auction_id, &self.pool).await?;
        Ok(LeaderboardResponse { active, past_winners })
    }

    pub async fn min_winning_bid(&self, auction_id: &AuctionId) -> Result<Option<i64>, StoreError> {
        let auction = self.get_auction(auction_id).await?;
        if auction.status != AuctionStatus::Active {
            return Ok(None);
        }
        let round = store::round::get_auction_round(auction_id, auction.current_round, &self.pool).await?;
        let amount = store::bid::min_winning_bid(
            auction_id,
            round.items_count,
            auction.bidding_params.min_bid_amount,
            auction.bidding_params.min_bid_increment,
            &self.pool,
        )
        .await?;
        Ok(Some(amount))
    }

    pub async fn my_bids(&self, auction_id: &AuctionId, user_id: &UserId) -> Result<Vec<Bid>, StoreError> {
        store::bid::list_bids_for_user(auction_id, user_id, &self.pool).await
    }

    pub async fn audit(&self) -> Result<AuditReport, StoreError> {
        store::audit::audit(&self.pool).await
    }
}

/// Fast-bid reconciliation: flushes the cache's admit into the durable
/// store, then re-runs the anti-sniping and outbid checks against it and
/// emits the `BidPlaced` event the slow path emits inline. No-op past the
/// point where the auction or round no longer matches what the cache saw,
/// since a more recent durable write (or round completion) already
/// supersedes this bid's effects.
#[allow(clippy::too_many_arguments)]
async fn reconcile_fast_bid(
    pool: &PgPool,
    sync_worker: &CacheSyncWorker,
    timer: &TimerDriver,
    notifier: &dyn Notifier,
    events: &EventBus,
    time_source: &TimeSource,
    auction_id: &AuctionId,
    user_id: &UserId,
    amount: i64,
) -> anyhow::Result<()> {
    sync_worker.full_sync(auction_id).await?;

    let bids = store::bid::list_bids_for_user(auction_id, user_id, pool).await?;
    let Some(bid) = bids.into_iter().find(|b| b.status == payloads::BidStatus::Active) else {
        return Ok(());
    };

    events.publish(AuctionEvent::BidPlaced {
        auction_id: *auction_id,
        bid_id: bid.id,
        user_id: *user_id,
        amount: bid.amount,
    });

    let auction = store::auction::get_auction(auction_id, pool).await?;
    if auction.status != AuctionStatus::Active {
        return Ok(());
    }
    let round = store::round::get_auction_round(auction_id, auction.current_round, pool).await?;

    if let Some(extended) = store::round::extend_if_sniped(
        auction_id,
        round.round_number,
        auction.bidding_params.anti_sniping_window_ms,
        auction.bidding_params.anti_sniping_extension_ms,
        auction.bidding_params.max_extensions,
        time_source,
        pool,
    )
    .await?
    {
        timer.update(auction_id, extended.end_time.as_millisecond()).await;
        events.publish(AuctionEvent::AuctionUpdated { auction_id: *auction_id });
        if store::round::mark_extension_notified(&round.id, pool).await.unwrap_or(false) {
            notifier
                .notify(Notification::AntiSnipingExtended {
                    auction_id: *auction_id,
                    round_number: round.round_number,
                    new_end_time_ms: extended.end_time.as_millisecond(),
                })
                .await;
        }
    }

    let outbid = store::bid::list_unnotified_outbid(auction_id, round.items_count, pool).await?;
    for outbid_bid in outbid {
        if outbid_bid.user_id == *user_id {
            continue;
        }
        if store::bid::mark_outbid_notified(&outbid_bid.id, time_source, pool)
            .await
            .unwrap_or(false)
        {
            notifier
                .notify(Notification::Outbid {
                    user_id: outbid_bid.user_id,
                    auction_id: *auction_id,
                    bid_id: outbid_bid.id,
                    outbid_by_amount: amount,
                })
                .await;
        }
    }

    Ok(())
}

async fn warmup_auction(pool: &PgPool, cache: &FastCache, auction_id: &AuctionId) -> anyhow::Result<()> {
    let auction = store::auction::get_auction(auction_id, pool).await?;
    let round_number = auction.current_round.max(1);
    let round = store::round::get_auction_round(auction_id, round_number, pool).await?;
    let bids = store::bid::list_active_bids(auction_id, pool).await?;
    let balances = store::user::list_positive_balances(pool).await?;
    cache
        .warmup(&auction, round.end_time.as_millisecond(), round.items_count, &bids, &balances)
        .await
}
