use crate::{AuctionId, BiddingParams, RoundConfig};
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuction {
    pub title: String,
    pub description: Option<String>,
    pub total_items: i32,
    pub rounds_config: Vec<RoundConfig>,
    pub bidding_params: Option<BiddingParams>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlaceBid {
    pub auction_id: AuctionId,
    pub amount: i64,
    /// Optional; used only to check the test-harness loopback allowlist.
    pub client_ip: Option<std::net::IpAddr>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: i64,
    pub offset: i64,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        LeaderboardQuery { limit: 50, offset: 0 }
    }
}
