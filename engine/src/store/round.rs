//! Round-state CRUD and the round-completion transaction.

use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    AuctionId, AuctionRoundId, AuctionStatus, BidId,
    responses::{self, AuctionRound},
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::StoreError;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbAuctionRound {
    pub id: AuctionRoundId,
    pub auction_id: AuctionId,
    pub round_number: i32,
    pub items_count: i32,
    #[sqlx(try_from = "SqlxTs")]
    pub start_time: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub end_time: Timestamp,
    pub actual_end_time: Option<SqlxTs>,
    pub extensions_count: i32,
    pub last_notified_extension_count: i32,
    pub completed: bool,
    pub winner_bid_ids: Vec<BidId>,
    pub version: i32,
}

impl From<DbAuctionRound> for AuctionRound {
    fn from(db: DbAuctionRound) -> Self {
        AuctionRound {
            id: db.id,
            auction_id: db.auction_id,
            round_number: db.round_number,
            items_count: db.items_count,
            start_time: db.start_time,
            end_time: db.end_time,
            extensions_count: db.extensions_count,
            last_notified_extension_count: db.last_notified_extension_count,
            completed: db.completed,
            version: db.version,
        }
    }
}

pub(crate) async fn arm_round_tx(
    auction_id: &AuctionId,
    round_number: i32,
    items_count: i32,
    start_time: Timestamp,
    end_time: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuctionRound, StoreError> {
    sqlx::query_as::<_, DbAuctionRound>(
        r#"
        INSERT INTO auction_rounds
            (auction_id, round_number, items_count, start_time, end_time,
             extensions_count, last_notified_extension_count, completed,
             winner_bid_ids, version)
        VALUES ($1, $2, $3, $4, $5, 0, 0, false, '{}', 0)
        RETURNING *
        "#,
    )
    .bind(auction_id)
    .bind(round_number)
    .bind(items_count)
    .bind(start_time.to_sqlx())
    .bind(end_time.to_sqlx())
    .fetch_one(&mut **tx)
    .await
    .map_err(StoreError::from)
}

pub(crate) async fn load_current_for_update_tx(
    auction_id: &AuctionId,
    round_number: i32,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuctionRound, StoreError> {
    sqlx::query_as::<_, DbAuctionRound>(
        "SELECT * FROM auction_rounds WHERE auction_id = $1 AND round_number = $2 FOR UPDATE",
    )
    .bind(auction_id)
    .bind(round_number)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("round {round_number} not found")))
}

pub async fn get_auction_round(
    auction_id: &AuctionId,
    round_number: i32,
    pool: &PgPool,
) -> Result<AuctionRound, StoreError> {
    let db: DbAuctionRound = sqlx::query_as(
        "SELECT * FROM auction_rounds WHERE auction_id = $1 AND round_number = $2",
    )
    .bind(auction_id)
    .bind(round_number)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("round {round_number} not found")))?;
    Ok(db.into())
}

pub async fn list_auction_rounds(
    auction_id: &AuctionId,
    pool: &PgPool,
) -> Result<Vec<AuctionRound>, StoreError> {
    let rows: Vec<DbAuctionRound> = sqlx::query_as(
        "SELECT * FROM auction_rounds WHERE auction_id = $1 ORDER BY round_number ASC",
    )
    .bind(auction_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Extends `end_time` by `anti_sniping_extension_ms` and increments
/// `extensions_count`. Caller has already checked
/// `extensions_count < max_extensions` and the remaining-time window.
pub(crate) async fn extend_round_end_time_tx(
    round: &DbAuctionRound,
    new_end_time: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuctionRound, StoreError> {
    sqlx::query_as::<_, DbAuctionRound>(
        r#"
        UPDATE auction_rounds
        SET end_time = $1, extensions_count = extensions_count + 1, version = version + 1
        WHERE id = $2 AND version = $3
        RETURNING *
        "#,
    )
    .bind(new_end_time.to_sqlx())
    .bind(round.id)
    .bind(round.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("round changed concurrently".into()))
}

/// CAS-updates `last_notified_extension_count` from `< extensions_count`,
/// used by the outbox to de-duplicate anti-sniping notifications as a
/// post-transaction step.
pub async fn mark_extension_notified(
    round_id: &AuctionRoundId,
    pool: &PgPool,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE auction_rounds
        SET last_notified_extension_count = extensions_count
        WHERE id = $1 AND last_notified_extension_count < extensions_count
        "#,
    )
    .bind(round_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reconciliation counterpart to the anti-sniping check inside
/// `place_bid_attempt`, used by the fast-bid path once the cache's admit has
/// been synced into the durable store. Re-checks the window and
/// `extensions_count` against the current row rather than trusting the
/// caller's view, so it's safe to call speculatively.
pub async fn extend_if_sniped(
    auction_id: &AuctionId,
    round_number: i32,
    anti_sniping_window_ms: i64,
    anti_sniping_extension_ms: i64,
    max_extensions: i32,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Option<AuctionRound>, StoreError> {
    let mut tx = pool.begin().await?;
    let round = load_current_for_update_tx(auction_id, round_number, &mut tx).await?;
    if round.completed || round.extensions_count >= max_extensions {
        return Ok(None);
    }
    let now_ms = time_source.now().as_millisecond();
    let end_ms = round.end_time.as_millisecond();
    let remaining_ms = end_ms - now_ms;
    if remaining_ms <= 0 || remaining_ms > anti_sniping_window_ms {
        return Ok(None);
    }
    let new_end_time = Timestamp::from_millisecond(end_ms + anti_sniping_extension_ms)
        .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
    let extended = extend_round_end_time_tx(&round, new_end_time, &mut tx).await?;
    tx.commit().await?;
    Ok(Some(extended.into()))
}

async fn mark_completed_tx(
    round: &DbAuctionRound,
    winner_bid_ids: &[BidId],
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuctionRound, StoreError> {
    sqlx::query_as::<_, DbAuctionRound>(
        r#"
        UPDATE auction_rounds
        SET completed = true, actual_end_time = $1, winner_bid_ids = $2, version = version + 1
        WHERE id = $3 AND version = $4
        RETURNING *
        "#,
    )
    .bind(now.to_sqlx())
    .bind(winner_bid_ids)
    .bind(round.id)
    .bind(round.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("round changed concurrently".into()))
}

/// Outcome of a round-completion transaction, used by the service layer to
/// decide which post-transaction notifications and timer updates to fire.
pub struct RoundCompletionOutcome {
    pub auction: responses::Auction,
    pub completed_round: AuctionRound,
    pub winners: Vec<responses::Bid>,
    pub losers: Vec<responses::Bid>,
    pub auction_completed: bool,
    pub next_round: Option<AuctionRound>,
}

/// Splits active bids into winners/losers, consumes or refunds frozen
/// balance, and either arms the next round or
/// completes the auction. A no-op (`Ok(None)`) if the auction isn't active,
/// the current round is already completed, or the round hasn't ended yet —
/// the scheduler calls this speculatively and relies on these checks for
/// idempotency.
pub async fn complete_round_tx(
    auction_id: &AuctionId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Option<RoundCompletionOutcome>, StoreError> {
    let mut tx = pool.begin().await?;
    let auction = super::auction::load_for_update_tx(auction_id, &mut tx).await?;
    if auction.status != AuctionStatus::Active {
        return Ok(None);
    }
    let now = time_source.now();
    let round = load_current_for_update_tx(auction_id, auction.current_round, &mut tx).await?;
    if round.completed || now < round.end_time {
        return Ok(None);
    }
    let auction = super::auction::cas_touch_active_tx(auction_id, &mut tx).await?;

    let mut bids = super::bid::load_active_sorted_for_update_tx(auction_id, &mut tx).await?;
    let winners_count = (round.items_count as usize).min(bids.len());
    let losers = bids.split_off(winners_count);
    let winners = bids;

    let previous_winners_count: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(cardinality(winner_bid_ids)), 0)
         FROM auction_rounds WHERE auction_id = $1 AND round_number < $2",
    )
    .bind(auction_id)
    .bind(round.round_number)
    .fetch_one(&mut *tx)
    .await?;

    let mut winner_responses = Vec::with_capacity(winners.len());
    let mut winner_bid_ids = Vec::with_capacity(winners.len());
    for (i, bid) in winners.into_iter().enumerate() {
        let item_number = previous_winners_count as i32 + i as i32 + 1;
        let won_bid = super::bid::cas_mark_won_tx(&bid, round.round_number, item_number, &mut tx)
            .await?;
        let user = super::user::get_user_for_update_tx(&bid.user_id, &mut tx).await?;
        super::user::consume_frozen_for_win_tx(
            &user,
            bid.amount,
            auction_id,
            &bid.id,
            time_source,
            &mut tx,
        )
        .await?;
        winner_bid_ids.push(won_bid.id);
        winner_responses.push(won_bid);
    }

    let is_last_round = round.round_number as usize >= auction_rounds_total(&auction);
    let should_complete = is_last_round || losers.is_empty();

    let mut loser_responses = Vec::with_capacity(losers.len());
    let mut auction_completed = false;
    let mut next_round = None;
    if should_complete {
        for bid in losers {
            let refunded = super::bid::cas_mark_refunded_tx(&bid, &mut tx).await?;
            let user = super::user::get_user_for_update_tx(&bid.user_id, &mut tx).await?;
            super::user::refund_frozen_tx(
                &user,
                bid.amount,
                auction_id,
                &bid.id,
                time_source,
                &mut tx,
            )
            .await?;
            loser_responses.push(refunded);
        }
        super::auction::cas_complete_tx(&auction, now, &mut tx).await?;
        auction_completed = true;
    } else {
        let next_config = auction
            .rounds_config
            .0
            .get(round.round_number as usize)
            .ok_or_else(|| StoreError::Internal(anyhow::anyhow!("missing next round config")))?
            .clone();
        let advanced = super::auction::cas_advance_round_tx(&auction, &mut tx).await?;
        let armed = arm_round_tx(
            auction_id,
            advanced.current_round,
            next_config.items_count,
            now,
            now + jiff::Span::new().minutes(next_config.duration_minutes),
            &mut tx,
        )
        .await?;
        next_round = Some(armed.into());
    }

    let completed_round = mark_completed_tx(&round, &winner_bid_ids, now, &mut tx).await?;
    let final_auction = super::auction::load_for_update_tx(auction_id, &mut tx).await?;
    tx.commit().await?;

    Ok(Some(RoundCompletionOutcome {
        auction: final_auction.try_into()?,
        completed_round: completed_round.into(),
        winners: winner_responses,
        losers: loser_responses,
        auction_completed,
        next_round,
    }))
}

fn auction_rounds_total(auction: &super::auction::DbAuction) -> usize {
    auction.rounds_config.0.len()
}
