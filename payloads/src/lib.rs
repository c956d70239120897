pub mod requests;
pub mod responses;

#[cfg(not(target_arch = "wasm32"))]
pub mod api_client;
#[cfg(not(target_arch = "wasm32"))]
pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id type wrappers help ensure we don't mix up ids for different tables.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct AuctionId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct AuctionRoundId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct BidId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct UserId(pub Uuid);

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct TransactionRecordId(pub Uuid);

/// Auction lifecycle. Closed enumeration; transitions are explicit
/// (`pending -> active -> completed`, or `pending -> cancelled`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "auction_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

/// Bid lifecycle. Once a bid reaches `Won`, `Refunded`, or `Cancelled` it is
/// immutable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "bid_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Active,
    Won,
    Refunded,
    Cancelled,
}

/// A single append-only ledger entry kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "transaction_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    BidFreeze,
    BidWin,
    BidRefund,
}

/// One entry of an auction's `roundsConfig`: how many items a round awards
/// and how long it runs once armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    pub items_count: i32,
    pub duration_minutes: i64,
}

/// Tunable bidding parameters for an auction. All have defaults per
/// creation rules; callers may override any subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiddingParams {
    pub min_bid_amount: i64,
    pub min_bid_increment: i64,
    pub anti_sniping_window_ms: i64,
    pub anti_sniping_extension_ms: i64,
    pub max_extensions: i32,
}

impl Default for BiddingParams {
    fn default() -> Self {
        BiddingParams {
            min_bid_amount: 100,
            min_bid_increment: 10,
            anti_sniping_window_ms: 5 * 60 * 1000,
            anti_sniping_extension_ms: 5 * 60 * 1000,
            max_extensions: 6,
        }
    }
}

/// Outcome tag returned by the fast-cache admit-bid primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitStatus {
    Ok,
    NotWarmed,
    NotActive,
    RoundEnded,
    UserNotWarmed,
    MinBid,
    BidTooLow,
    InsufficientBalance,
}
