//! Round Expiry Scheduler: a singleton loop, coordinated by leader
//! election rather than the Postgres advisory-lock pattern this was
//! originally adapted from, since many short-lived scans benefit more from
//! a Redis NX/EX lease than a session-scoped advisory lock.

use std::sync::Arc;
use std::time::Duration;

use payloads::AuctionStatus;
use sqlx::PgPool;
use tokio::time;

use crate::leader::LeaderElector;
use crate::service::AuctionService;
use crate::telemetry::log_error;

pub struct Scheduler {
    pool: PgPool,
    service: Arc<AuctionService>,
    elector: LeaderElector,
    period: Duration,
}

impl Scheduler {
    pub fn new(pool: PgPool, service: Arc<AuctionService>, elector: LeaderElector, period: Duration) -> Self {
        Self {
            pool,
            service,
            elector,
            period,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.period);
        loop {
            interval.tick().await;
            if !matches!(self.elector.try_become_leader().await, Ok(true)) {
                continue;
            }
            if let Err(e) = self.scan_tick().await {
                log_error(e);
            }
        }
    }

    /// Scans active auctions whose current round has ended and invokes
    /// `completeRound` for each. `completeRound` is itself CAS-guarded, so
    /// a second scheduler instance elected concurrently produces no
    /// duplicate effect.
    #[tracing::instrument(skip(self))]
    async fn scan_tick(&self) -> anyhow::Result<()> {
        let auctions = crate::store::auction::list_auctions(Some(AuctionStatus::Active), &self.pool).await?;
        for auction in auctions {
            let Some(round_number) = Some(auction.current_round).filter(|n| *n > 0) else {
                continue;
            };
            let round =
                crate::store::round::get_auction_round(&auction.id, round_number, &self.pool).await?;
            if round.completed {
                continue;
            }
            let now = self.service.time_source.now();
            if now < round.end_time {
                continue;
            }
            if let Err(e) = self.service.complete_round(&auction.id).await {
                tracing::error!(auction_id = %auction.id, error = %e, "round completion failed, will retry next tick");
            }
        }
        Ok(())
    }
}
