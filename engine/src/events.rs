//! WebSocket event payloads, carried over an in-process broadcast bus. Real
//! transport (an actix-web WS upgrade handler) is out of scope; this models
//! the six event kinds a WS layer would fan out, so callers (and tests) can
//! subscribe to the same stream.

use payloads::{AuctionId, BidId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::timer::TimerTick;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuctionEvent {
    AuctionUpdated {
        auction_id: AuctionId,
    },
    RoundStarted {
        auction_id: AuctionId,
        round_number: i32,
    },
    RoundCompleted {
        auction_id: AuctionId,
        round_number: i32,
    },
    AuctionCompleted {
        auction_id: AuctionId,
    },
    BidPlaced {
        auction_id: AuctionId,
        bid_id: BidId,
        user_id: UserId,
        amount: i64,
    },
    TimerTick(TimerTick),
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuctionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(4096);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AuctionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
