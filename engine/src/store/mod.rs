//! Durable store adapter: typed, transactional access to `Auction`, `Bid`,
//! `User`, and `TransactionRecord` records.
//!
//! ## Design decisions
//!
//! ### Optimistic concurrency
//! Every mutable row (`auctions`, `auction_rounds`, `bids`, `users`) carries
//! a `version` column. Mutating statements predicate on `version = $n` and
//! the caller checks the affected row count; a mismatch means someone else
//! committed first and the caller retries from the top of its transaction
//! (see `AuctionService::place_bid_with_retry`).
//!
//! ### Money as integers
//! All balances, bid amounts, and ledger entries are `i64`; there is no
//! fractional-currency concept to model here.
//!
//! ### Time source dependency
//! Every function that reasons about "now" takes a `&TimeSource` rather
//! than calling `Timestamp::now()` directly, so tests can drive round
//! timing deterministically.

pub mod audit;
pub mod auction;
pub mod bid;
pub mod round;
pub mod user;

use payloads::{AuctionId, BidId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::Conflict(format!(
                "unique constraint violated: {}",
                db_err.constraint().unwrap_or("unknown")
            ));
        }
        StoreError::Database(e)
    }
}

impl StoreError {
    pub fn auction_not_found(id: &AuctionId) -> Self {
        StoreError::NotFound(format!("auction {id} not found"))
    }

    pub fn bid_not_found(id: &BidId) -> Self {
        StoreError::NotFound(format!("bid {id} not found"))
    }

    pub fn user_not_found(id: &UserId) -> Self {
        StoreError::NotFound(format!("user {id} not found"))
    }
}
