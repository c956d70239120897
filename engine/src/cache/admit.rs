//! The atomic admit-bid primitive: a single Lua script executed server-side
//! so validation, freeze, and leaderboard update happen in one round-trip.

use payloads::{AdmitStatus, AuctionId, UserId};
use redis::aio::MultiplexedConnection;

#[derive(Debug, thiserror::Error)]
pub enum AtomicAdmitError {
    #[error("amount exceeds the safe leaderboard score encoding range")]
    AmountExceedsScoreCap,
}

#[derive(Debug, Clone, Copy)]
pub struct AdmitOutcome {
    pub status: AdmitStatus,
    pub new_amount: i64,
    pub previous_amount: i64,
    pub delta: i64,
    pub is_new_bid: bool,
    pub round_end_time_ms: i64,
}

// KEYS: 1=meta 2=balance 3=bid 4=leaderboard 5=dirty-users 6=dirty-bids
// ARGV: 1=userId 2=amount 3=nowMs 4=scoreAmountCap
const ADMIT_SCRIPT: &str = r#"
local meta = redis.call('HGETALL', KEYS[1])
if #meta == 0 then
    return {'NOT_WARMED', 0, 0, 0, 0, 0}
end
local m = {}
for i = 1, #meta, 2 do m[meta[i]] = meta[i + 1] end

if m['status'] ~= 'active' then
    return {'NOT_ACTIVE', 0, 0, 0, 0, tonumber(m['roundEndTime']) or 0}
end

local nowMs = tonumber(ARGV[3])
local roundEndTime = tonumber(m['roundEndTime'])
if nowMs > roundEndTime - 100 then
    return {'ROUND_ENDED', 0, 0, 0, 0, roundEndTime}
end

local amount = tonumber(ARGV[2])
local minBidAmount = tonumber(m['minBidAmount'])
if amount < minBidAmount then
    return {'MIN_BID', 0, 0, 0, 0, roundEndTime}
end

local available = tonumber(redis.call('HGET', KEYS[2], 'available') or '0')
local frozen = tonumber(redis.call('HGET', KEYS[2], 'frozen') or '0')
if available == 0 and frozen == 0 then
    return {'USER_NOT_WARMED', 0, 0, 0, 0, roundEndTime}
end

local currentAmount = tonumber(redis.call('HGET', KEYS[3], 'amount') or '0')
local currentCreatedAt = tonumber(redis.call('HGET', KEYS[3], 'createdAt') or '0')
if amount <= currentAmount then
    return {'BID_TOO_LOW', 0, currentAmount, 0, 0, roundEndTime}
end

local delta = amount - currentAmount
if available < delta then
    return {'INSUFFICIENT_BALANCE', 0, currentAmount, delta, 0, roundEndTime}
end

local scoreAmountCap = tonumber(ARGV[4])
if amount >= scoreAmountCap then
    return {'AMOUNT_EXCEEDS_CAP', 0, currentAmount, delta, 0, roundEndTime}
end

local isNewBid = currentAmount == 0
local bidTimestamp = isNewBid and nowMs or currentCreatedAt

redis.call('HSET', KEYS[2], 'available', available - delta, 'frozen', frozen + delta)
local version = tonumber(redis.call('HGET', KEYS[3], 'version') or '0')
redis.call('HSET', KEYS[3], 'amount', amount, 'createdAt', bidTimestamp, 'version', version + 1)
redis.call('SADD', KEYS[5], ARGV[1])
redis.call('SADD', KEYS[6], ARGV[1])

local score = amount * 1e13 + (9999999999999 - bidTimestamp)
redis.call('ZADD', KEYS[4], score, ARGV[1])

return {'OK', amount, currentAmount, delta, isNewBid and 1 or 0, roundEndTime}
"#;

pub async fn admit_bid(
    conn: &mut MultiplexedConnection,
    auction_id: &AuctionId,
    user_id: &UserId,
    amount: i64,
    now_ms: i64,
) -> anyhow::Result<AdmitOutcome> {
    let script = redis::Script::new(ADMIT_SCRIPT);
    let result: (String, i64, i64, i64, i64, i64) = script
        .key(super::meta_key(auction_id))
        .key(format!("balance:{auction_id}:{user_id}"))
        .key(format!("bid:{auction_id}:{user_id}"))
        .key(super::leaderboard_key(auction_id))
        .key(format!("dirty-users:{auction_id}"))
        .key(format!("dirty-bids:{auction_id}"))
        .arg(user_id.to_string())
        .arg(amount)
        .arg(now_ms)
        .arg(super::SCORE_AMOUNT_CAP)
        .invoke_async(conn)
        .await?;

    let status = match result.0.as_str() {
        "OK" => AdmitStatus::Ok,
        "NOT_WARMED" => AdmitStatus::NotWarmed,
        "NOT_ACTIVE" => AdmitStatus::NotActive,
        "ROUND_ENDED" => AdmitStatus::RoundEnded,
        "USER_NOT_WARMED" => AdmitStatus::UserNotWarmed,
        "MIN_BID" => AdmitStatus::MinBid,
        "BID_TOO_LOW" => AdmitStatus::BidTooLow,
        "INSUFFICIENT_BALANCE" => AdmitStatus::InsufficientBalance,
        "AMOUNT_EXCEEDS_CAP" => return Err(AtomicAdmitError::AmountExceedsScoreCap.into()),
        other => anyhow::bail!("unexpected admit-bid status from cache script: {other}"),
    };

    Ok(AdmitOutcome {
        status,
        new_amount: result.1,
        previous_amount: result.2,
        delta: result.3,
        is_new_bid: result.4 != 0,
        round_end_time_ms: result.5,
    })
}
