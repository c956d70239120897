//! Notification outbox: fire-and-forget delivery, with at-most-once
//! semantics enforced upstream by CAS-ing a `*_notified_at` flag from null
//! before enqueuing. `Notifier` is the seam a real push/Telegram sink would
//! implement; `LoggingNotifier` stands in for it here.

use payloads::{AuctionId, BidId, UserId};

#[derive(Debug, Clone)]
pub enum Notification {
    Outbid {
        user_id: UserId,
        auction_id: AuctionId,
        bid_id: BidId,
        outbid_by_amount: i64,
    },
    AntiSnipingExtended {
        auction_id: AuctionId,
        round_number: i32,
        new_end_time_ms: i64,
    },
    RoundWin {
        user_id: UserId,
        auction_id: AuctionId,
        bid_id: BidId,
        item_number: i32,
    },
    RoundLoss {
        user_id: UserId,
        auction_id: AuctionId,
        bid_id: BidId,
    },
    NewRound {
        auction_id: AuctionId,
        round_number: i32,
    },
    AuctionComplete {
        auction_id: AuctionId,
    },
}

/// Delivery is out of scope: this trait is the seam a real notifier (push,
/// Telegram, email) would implement.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

pub struct LoggingNotifier;

#[async_trait::async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(?notification, "notification delivered");
    }
}
