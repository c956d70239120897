use jiff_sqlx::ToSqlx;
use payloads::{AuctionId, BidId, TransactionKind, UserId, responses};
use sqlx::{PgPool, Postgres, Transaction};

use super::StoreError;
use crate::time::TimeSource;

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub is_bot: bool,
    pub balance: i64,
    pub frozen_balance: i64,
    pub version: i32,
}

pub async fn create_user(
    username: &str,
    initial_balance: i64,
    is_bot: bool,
    pool: &PgPool,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, is_bot, balance, frozen_balance, version)
        VALUES ($1, $2, $3, 0, 0)
        RETURNING id, is_bot, balance, frozen_balance, version
        "#,
    )
    .bind(username)
    .bind(is_bot)
    .bind(initial_balance)
    .fetch_one(pool)
    .await
    .map_err(StoreError::from)
}

pub async fn get_user(user_id: &UserId, pool: &PgPool) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        "SELECT id, is_bot, balance, frozen_balance, version FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::user_not_found(user_id))
}

/// Locks the user row for the remainder of the transaction.
pub async fn get_user_for_update_tx(
    user_id: &UserId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>(
        "SELECT id, is_bot, balance, frozen_balance, version FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::user_not_found(user_id))
}

/// Reserves `delta` out of the user's spendable balance into
/// `frozen_balance`. Fails with `Conflict` if the CAS predicate (`version`
/// and sufficient balance) no longer holds.
pub async fn freeze_for_bid_tx(
    user: &User,
    delta: i64,
    auction_id: &AuctionId,
    bid_id: &BidId,
    time_source: &TimeSource,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<User, StoreError> {
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET balance = balance - $1, frozen_balance = frozen_balance + $1, version = version + 1
        WHERE id = $2 AND version = $3 AND balance >= $1
        RETURNING id, is_bot, balance, frozen_balance, version
        "#,
    )
    .bind(delta)
    .bind(user.id)
    .bind(user.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("user balance changed concurrently".into()))?;

    append_transaction_record_tx(
        updated.id,
        TransactionKind::BidFreeze,
        delta,
        user.balance,
        updated.balance,
        user.frozen_balance,
        updated.frozen_balance,
        Some(*auction_id),
        Some(*bid_id),
        time_source,
        tx,
    )
    .await?;

    Ok(updated)
}

/// Consumes `amount` of frozen balance permanently on a winning bid: funds
/// leave the user entirely, with no corresponding increase to `balance`.
pub async fn consume_frozen_for_win_tx(
    user: &User,
    amount: i64,
    auction_id: &AuctionId,
    bid_id: &BidId,
    time_source: &TimeSource,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<User, StoreError> {
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET frozen_balance = frozen_balance - $1, version = version + 1
        WHERE id = $2 AND version = $3 AND frozen_balance >= $1
        RETURNING id, is_bot, balance, frozen_balance, version
        "#,
    )
    .bind(amount)
    .bind(user.id)
    .bind(user.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("user frozen balance changed concurrently".into()))?;

    append_transaction_record_tx(
        updated.id,
        TransactionKind::BidWin,
        amount,
        user.balance,
        updated.balance,
        user.frozen_balance,
        updated.frozen_balance,
        Some(*auction_id),
        Some(*bid_id),
        time_source,
        tx,
    )
    .await?;

    Ok(updated)
}

/// Returns `amount` of frozen balance back to spendable balance on a losing
/// bid.
pub async fn refund_frozen_tx(
    user: &User,
    amount: i64,
    auction_id: &AuctionId,
    bid_id: &BidId,
    time_source: &TimeSource,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<User, StoreError> {
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET balance = balance + $1, frozen_balance = frozen_balance - $1, version = version + 1
        WHERE id = $2 AND version = $3 AND frozen_balance >= $1
        RETURNING id, is_bot, balance, frozen_balance, version
        "#,
    )
    .bind(amount)
    .bind(user.id)
    .bind(user.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("user frozen balance changed concurrently".into()))?;

    append_transaction_record_tx(
        updated.id,
        TransactionKind::BidRefund,
        amount,
        user.balance,
        updated.balance,
        user.frozen_balance,
        updated.frozen_balance,
        Some(*auction_id),
        Some(*bid_id),
        time_source,
        tx,
    )
    .await?;

    Ok(updated)
}

#[allow(clippy::too_many_arguments)]
pub async fn append_transaction_record_tx(
    user_id: UserId,
    kind: TransactionKind,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    frozen_before: i64,
    frozen_after: i64,
    auction_id: Option<AuctionId>,
    bid_id: Option<BidId>,
    time_source: &TimeSource,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO transaction_records
            (user_id, kind, amount, balance_before, balance_after,
             frozen_before, frozen_after, auction_id, bid_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(amount)
    .bind(balance_before)
    .bind(balance_after)
    .bind(frozen_before)
    .bind(frozen_after)
    .bind(auction_id)
    .bind(bid_id)
    .bind(time_source.now().to_sqlx())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn list_transactions(
    user_id: &UserId,
    pool: &PgPool,
) -> Result<Vec<responses::TransactionRecord>, StoreError> {
    let records = sqlx::query_as::<_, responses::TransactionRecord>(
        "SELECT * FROM transaction_records WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Users with spendable or frozen funds, for cache warmup — users at zero
/// on both are never bidders and aren't worth a balance hash entry.
pub async fn list_positive_balances(pool: &PgPool) -> Result<Vec<(UserId, i64, i64)>, StoreError> {
    let rows: Vec<(UserId, i64, i64)> = sqlx::query_as(
        "SELECT id, balance, frozen_balance FROM users WHERE balance > 0 OR frozen_balance > 0",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Sum of `balance` and `frozen_balance` across all users, for the audit
/// endpoint.
pub async fn sum_balances(pool: &PgPool) -> Result<(i64, i64), StoreError> {
    let row: (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT SUM(balance), SUM(frozen_balance) FROM users")
            .fetch_one(pool)
            .await?;
    Ok((row.0.unwrap_or(0), row.1.unwrap_or(0)))
}
