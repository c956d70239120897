use crate::{
    AdmitStatus, AuctionId, AuctionRoundId, AuctionStatus, BidId, BidStatus,
    BiddingParams, RoundConfig, TransactionKind, TransactionRecordId, UserId,
};
use jiff::Timestamp;
#[cfg(feature = "use-sqlx")]
use jiff_sqlx::Timestamp as SqlxTs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub title: String,
    pub description: Option<String>,
    pub status: AuctionStatus,
    pub total_items: i32,
    pub rounds_config: Vec<RoundConfig>,
    pub current_round: i32,
    pub bidding_params: BiddingParams,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub created_at: Timestamp,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct AuctionRound {
    pub id: AuctionRoundId,
    pub auction_id: AuctionId,
    pub round_number: i32,
    pub items_count: i32,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub start_time: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub end_time: Timestamp,
    pub extensions_count: i32,
    pub last_notified_extension_count: i32,
    pub completed: bool,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: i64,
    pub status: BidStatus,
    pub won_round: Option<i32>,
    pub item_number: Option<i32>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub updated_at: Timestamp,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    pub balance: i64,
    pub frozen_balance: i64,
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct TransactionRecord {
    pub id: TransactionRecordId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub frozen_before: i64,
    pub frozen_after: i64,
    pub auction_id: Option<AuctionId>,
    pub bid_id: Option<BidId>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub amount: i64,
    pub created_at: Timestamp,
    pub is_winning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub active: Vec<LeaderboardEntry>,
    pub past_winners: Vec<Bid>,
}

/// Result of a slow-path bid: the mutated bid and the auction as it stood
/// after the transaction committed (including any anti-sniping extension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceBidResult {
    pub bid: Bid,
    pub auction: Auction,
}

/// Result of a fast-path bid: compact, includes the bidder's resulting
/// leaderboard rank (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FastBidResult {
    pub status: AdmitStatus,
    pub amount: i64,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total_balance: i64,
    pub total_frozen: i64,
    pub total_won_amount: i64,
    pub total_active_bid_amount: i64,
    pub discrepancy: i64,
    pub is_valid: bool,
}
