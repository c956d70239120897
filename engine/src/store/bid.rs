//! Bid CRUD and the standard (slow-path) place-bid transaction.

use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{AuctionId, AuctionRoundId, BidId, BidStatus, UserId, responses};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::StoreError;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbBid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: i64,
    pub status: BidStatus,
    pub won_round: Option<i32>,
    pub item_number: Option<i32>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub last_processed_at: Timestamp,
    pub outbid_notified_at: Option<SqlxTs>,
    pub version: i32,
}

impl From<DbBid> for responses::Bid {
    fn from(db: DbBid) -> Self {
        responses::Bid {
            id: db.id,
            auction_id: db.auction_id,
            user_id: db.user_id,
            amount: db.amount,
            status: db.status,
            won_round: db.won_round,
            item_number: db.item_number,
            created_at: db.created_at,
            updated_at: db.updated_at,
            version: db.version,
        }
    }
}

pub async fn get_bid(bid_id: &BidId, pool: &PgPool) -> Result<responses::Bid, StoreError> {
    let db: DbBid = sqlx::query_as("SELECT * FROM bids WHERE id = $1")
        .bind(bid_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::bid_not_found(bid_id))?;
    Ok(db.into())
}

pub async fn list_bids_for_user(
    auction_id: &AuctionId,
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::Bid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        "SELECT * FROM bids WHERE auction_id = $1 AND user_id = $2 ORDER BY created_at ASC",
    )
    .bind(auction_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub(crate) async fn load_active_sorted_for_update_tx(
    auction_id: &AuctionId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Vec<DbBid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        r#"
        SELECT * FROM bids
        WHERE auction_id = $1 AND status = 'active'
        ORDER BY amount DESC, created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(auction_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn get_active_for_user_tx(
    auction_id: &AuctionId,
    user_id: &UserId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<DbBid>, StoreError> {
    let row: Option<DbBid> = sqlx::query_as(
        "SELECT * FROM bids WHERE auction_id = $1 AND user_id = $2 AND status = 'active' FOR UPDATE",
    )
    .bind(auction_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

async fn amount_taken_tx(
    auction_id: &AuctionId,
    amount: i64,
    excluding: &BidId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<bool, StoreError> {
    let row: Option<(BidId,)> = sqlx::query_as(
        r#"
        SELECT id FROM bids
        WHERE auction_id = $1 AND amount = $2 AND status = 'active' AND id != $3
        "#,
    )
    .bind(auction_id)
    .bind(amount)
    .bind(excluding)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.is_some())
}

async fn create_active_bid_tx(
    auction_id: &AuctionId,
    user_id: &UserId,
    amount: i64,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbBid, StoreError> {
    sqlx::query_as::<_, DbBid>(
        r#"
        INSERT INTO bids
            (auction_id, user_id, amount, status, created_at, updated_at,
             last_processed_at, version)
        VALUES ($1, $2, $3, 'active', $4, $4, $4, 0)
        RETURNING *
        "#,
    )
    .bind(auction_id)
    .bind(user_id)
    .bind(amount)
    .bind(now.to_sqlx())
    .fetch_one(&mut **tx)
    .await
    .map_err(StoreError::from)
}

async fn cas_update_amount_tx(
    bid: &DbBid,
    new_amount: i64,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbBid, StoreError> {
    sqlx::query_as::<_, DbBid>(
        r#"
        UPDATE bids
        SET amount = $1, updated_at = $2, outbid_notified_at = NULL, version = version + 1
        WHERE id = $3 AND version = $4 AND amount = $5
        RETURNING *
        "#,
    )
    .bind(new_amount)
    .bind(now.to_sqlx())
    .bind(bid.id)
    .bind(bid.version)
    .bind(bid.amount)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("bid changed concurrently".into()))
}

pub(crate) async fn cas_mark_won_tx(
    bid: &DbBid,
    won_round: i32,
    item_number: i32,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<responses::Bid, StoreError> {
    let updated: DbBid = sqlx::query_as(
        r#"
        UPDATE bids
        SET status = 'won', won_round = $1, item_number = $2, version = version + 1
        WHERE id = $3 AND version = $4 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(won_round)
    .bind(item_number)
    .bind(bid.id)
    .bind(bid.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("bid changed concurrently".into()))?;
    Ok(updated.into())
}

pub(crate) async fn cas_mark_refunded_tx(
    bid: &DbBid,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<responses::Bid, StoreError> {
    let updated: DbBid = sqlx::query_as(
        r#"
        UPDATE bids
        SET status = 'refunded', version = version + 1
        WHERE id = $1 AND version = $2 AND status = 'active'
        RETURNING *
        "#,
    )
    .bind(bid.id)
    .bind(bid.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("bid changed concurrently".into()))?;
    Ok(updated.into())
}

/// CAS-updates `outbid_notified_at` from null to `now`, used by the outbox
/// to ensure at-most-once outbid notifications as a post-transaction step.
pub async fn mark_outbid_notified(
    bid_id: &BidId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE bids SET outbid_notified_at = $1 WHERE id = $2 AND outbid_notified_at IS NULL",
    )
    .bind(time_source.now().to_sqlx())
    .bind(bid_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Active bids ranked outside the round's winning cutoff that haven't been
/// flagged for an outbid notification yet. Used by the fast-bid path's
/// reconciliation, which has no before/after snapshot to diff against and so
/// derives the outbid set from the durable ranking directly.
pub async fn list_unnotified_outbid(
    auction_id: &AuctionId,
    items_count: i32,
    pool: &PgPool,
) -> Result<Vec<responses::Bid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        r#"
        SELECT * FROM bids
        WHERE auction_id = $1 AND status = 'active' AND outbid_notified_at IS NULL
        ORDER BY amount DESC, created_at ASC
        OFFSET $2
        "#,
    )
    .bind(auction_id)
    .bind(items_count.max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Active bids ranked by standing (highest amount first, ties broken by
/// earliest `created_at`), for cache warmup and the leaderboard read path.
pub async fn list_active_bids(auction_id: &AuctionId, pool: &PgPool) -> Result<Vec<responses::Bid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        "SELECT * FROM bids WHERE auction_id = $1 AND status = 'active' ORDER BY amount DESC, created_at ASC",
    )
    .bind(auction_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// One page of `list_active_bids`, for the leaderboard endpoint.
pub async fn list_active_bids_page(
    auction_id: &AuctionId,
    limit: i64,
    offset: i64,
    pool: &PgPool,
) -> Result<Vec<responses::Bid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        r#"
        SELECT * FROM bids
        WHERE auction_id = $1 AND status = 'active'
        ORDER BY amount DESC, created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(auction_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Bids that won a slot, ordered by the item number they were awarded.
pub async fn list_past_winners(auction_id: &AuctionId, pool: &PgPool) -> Result<Vec<responses::Bid>, StoreError> {
    let rows: Vec<DbBid> = sqlx::query_as(
        "SELECT * FROM bids WHERE auction_id = $1 AND status = 'won' ORDER BY item_number ASC",
    )
    .bind(auction_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Sum of `amount` over all currently-active bids, for the audit endpoint.
pub async fn sum_active_bid_amounts(pool: &PgPool) -> Result<i64, StoreError> {
    let total: Option<i64> =
        sqlx::query_scalar("SELECT SUM(amount) FROM bids WHERE status = 'active'")
            .fetch_one(pool)
            .await?;
    Ok(total.unwrap_or(0))
}

/// Sum of `amount` over all won bids, for the audit endpoint.
pub async fn sum_won_bid_amounts(pool: &PgPool) -> Result<i64, StoreError> {
    let total: Option<i64> =
        sqlx::query_scalar("SELECT SUM(amount) FROM bids WHERE status = 'won'")
            .fetch_one(pool)
            .await?;
    Ok(total.unwrap_or(0))
}

/// The amount a new bid would need to clear the current round's last
/// winning slot.
pub async fn min_winning_bid(
    auction_id: &AuctionId,
    items_in_round: i32,
    min_bid_amount: i64,
    min_bid_increment: i64,
    pool: &PgPool,
) -> Result<i64, StoreError> {
    let boundary: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT amount FROM bids
        WHERE auction_id = $1 AND status = 'active'
        ORDER BY amount DESC, created_at ASC
        OFFSET $2 LIMIT 1
        "#,
    )
    .bind(auction_id)
    .bind((items_in_round - 1).max(0))
    .fetch_optional(pool)
    .await?;
    Ok(match boundary {
        Some(amount) => amount + min_bid_increment,
        None => min_bid_amount,
    })
}

/// Outcome of a successful slow-path bid, carrying enough context for the
/// service layer's post-transaction notification/timer work.
pub struct PlaceBidOutcome {
    pub bid: responses::Bid,
    pub auction: responses::Auction,
    pub round_id: AuctionRoundId,
    pub round_number: i32,
    pub anti_sniping_triggered: bool,
    pub new_round_end_time: Option<Timestamp>,
    pub outbid_user_ids: Vec<UserId>,
}

/// One attempt at the standard place-bid transaction. Callers retry on
/// `StoreError::Conflict` with backoff per the configured retry policy;
/// this function does not retry internally.
pub async fn place_bid_attempt(
    auction_id: &AuctionId,
    user_id: &UserId,
    amount: i64,
    time_source: &TimeSource,
    boundary_buffer_ms: i64,
    pool: &PgPool,
) -> Result<PlaceBidOutcome, StoreError> {
    if amount <= 0 {
        return Err(StoreError::Validation("amount must be positive".into()));
    }

    let mut tx = pool.begin().await?;

    // a. CAS-load auction.
    let auction = super::auction::cas_touch_active_tx(auction_id, &mut tx).await?;

    // b/c. Current round must exist, not be completed, and not be within
    // the boundary buffer of ending.
    let round =
        super::round::load_current_for_update_tx(auction_id, auction.current_round, &mut tx)
            .await?;
    if round.completed {
        return Err(StoreError::InvalidState("round already completed".into()));
    }
    let now = time_source.now();
    let now_ms = now.as_millisecond();
    let end_ms = round.end_time.as_millisecond();
    if now_ms > end_ms - boundary_buffer_ms {
        return Err(StoreError::InvalidState("round ended or about to".into()));
    }

    // d. Minimum bid amount.
    if amount < auction.min_bid_amount {
        return Err(StoreError::Validation(format!(
            "amount must be >= minBidAmount ({})",
            auction.min_bid_amount
        )));
    }

    // e. Load user.
    let user = super::user::get_user_for_update_tx(user_id, &mut tx).await?;

    // f. Snapshot winning set before this bid is applied.
    let before = load_active_sorted_for_update_tx(auction_id, &mut tx).await?;
    let winners_before: std::collections::HashSet<UserId> = before
        .iter()
        .take(round.items_count as usize)
        .map(|b| b.user_id)
        .collect();

    // g. Acquire/create bid row.
    let existing = get_active_for_user_tx(auction_id, user_id, &mut tx).await?;
    let is_new_bid = existing.is_none();
    let bid = match existing {
        Some(b) => b,
        None => create_active_bid_tx(auction_id, user_id, amount, now, &mut tx).await?,
    };

    // h. Amount-uniqueness pre-check (rollback on violation undoes the
    // just-created row automatically, since the transaction is never
    // committed).
    if amount_taken_tx(auction_id, amount, &bid.id, &mut tx).await? {
        return Err(StoreError::Conflict("amount taken".into()));
    }

    // i. Funds delta.
    let delta = if is_new_bid {
        if user.balance < amount {
            return Err(StoreError::Validation("insufficient balance".into()));
        }
        amount
    } else {
        if amount <= bid.amount || amount - bid.amount < auction.min_bid_increment {
            return Err(StoreError::Validation(
                "amount must exceed current bid by at least minBidIncrement".into(),
            ));
        }
        let delta = amount - bid.amount;
        if user.balance < delta {
            return Err(StoreError::Validation("insufficient balance".into()));
        }
        delta
    };

    // j/k. Freeze funds and append the ledger entry.
    super::user::freeze_for_bid_tx(&user, delta, auction_id, &bid.id, time_source, &mut tx)
        .await?;

    // l. Apply the new amount to the bid row.
    let bid = if is_new_bid {
        bid
    } else {
        cas_update_amount_tx(&bid, amount, now, &mut tx).await?
    };

    // m. Anti-sniping extension.
    let remaining_ms = end_ms - now_ms;
    let mut anti_sniping_triggered = false;
    let mut new_round_end_time = None;
    if remaining_ms > 0
        && remaining_ms <= auction.anti_sniping_window_ms
        && round.extensions_count < auction.max_extensions
    {
        let extended_end = Timestamp::from_millisecond(end_ms + auction.anti_sniping_extension_ms)
            .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
        super::round::extend_round_end_time_tx(&round, extended_end, &mut tx).await?;
        anti_sniping_triggered = true;
        new_round_end_time = Some(extended_end);
    }

    // n. Outbid computation.
    let after = load_active_sorted_for_update_tx(auction_id, &mut tx).await?;
    let winners_after: std::collections::HashSet<UserId> = after
        .iter()
        .take(round.items_count as usize)
        .map(|b| b.user_id)
        .collect();
    let outbid_user_ids: Vec<UserId> = winners_before
        .difference(&winners_after)
        .filter(|id| **id != *user_id)
        .copied()
        .collect();

    let final_bid: responses::Bid = sqlx::query_as::<_, DbBid>("SELECT * FROM bids WHERE id = $1")
        .bind(bid.id)
        .fetch_one(&mut *tx)
        .await?
        .into();
    let final_auction = super::auction::load_for_update_tx(auction_id, &mut tx).await?;

    tx.commit().await?;

    Ok(PlaceBidOutcome {
        bid: final_bid,
        auction: final_auction.try_into()?,
        round_id: round.id,
        round_number: round.round_number,
        anti_sniping_triggered,
        new_round_end_time,
        outbid_user_ids,
    })
}
