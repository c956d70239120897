//! Realistic multi-round auction dataset for manual exploration and for
//! tests that need a populated auction rather than a fresh empty one.

use crate::TestApp;
use anyhow::Result;
use payloads::{AuctionId, RoundConfig, UserId, requests};

pub struct DevDataset {
    pub alice: UserId,
    pub bob: UserId,
    pub charlie: UserId,
    /// Hasn't started yet.
    pub pending_auction: AuctionId,
    /// Started, with several rounds already processed.
    pub ongoing_auction: AuctionId,
}

impl DevDataset {
    /// Creates three funded bidders, a not-yet-started auction, and a
    /// multi-round auction with bidding history already processed.
    pub async fn create(app: &TestApp) -> Result<Self> {
        tracing::info!("creating three test bidders");
        let alice = app.create_user("alice", 10_000).await?;
        let bob = app.create_user("bob", 10_000).await?;
        let charlie = app.create_user("charlie", 10_000).await?;

        tracing::info!("creating a pending auction");
        let pending_auction = create_auction(
            app,
            "Downtown coworking desks",
            3,
            vec![RoundConfig { items_count: 3, duration_minutes: 3 }],
        )
        .await?;

        tracing::info!("creating and running an ongoing auction");
        let ongoing_auction =
            create_and_run_auction(app, alice, bob, charlie).await?;

        tracing::info!("dataset ready");
        Ok(DevDataset { alice, bob, charlie, pending_auction, ongoing_auction })
    }

    pub fn print_summary(&self) {
        tracing::info!("pending auction: {}", self.pending_auction);
        tracing::info!("ongoing auction: {}", self.ongoing_auction);
        tracing::info!(
            "bidders: alice={} bob={} charlie={}",
            self.alice,
            self.bob,
            self.charlie
        );
    }
}

async fn create_auction(
    app: &TestApp,
    title: &str,
    total_items: i32,
    rounds_config: Vec<RoundConfig>,
) -> Result<AuctionId> {
    let body = requests::CreateAuction {
        title: title.to_string(),
        description: None,
        total_items,
        rounds_config,
        bidding_params: None,
    };
    Ok(app.client.create_auction(&body).await?)
}

/// Starts a three-round, three-item auction, has each bidder place one bid
/// per round, and processes all three rounds so the dataset shows completed
/// history alongside the still-pending auction.
async fn create_and_run_auction(
    app: &TestApp,
    alice: UserId,
    bob: UserId,
    charlie: UserId,
) -> Result<AuctionId> {
    let auction_id = create_auction(
        app,
        "Meeting room blocks",
        3,
        vec![RoundConfig { items_count: 1, duration_minutes: 1 }; 3],
    )
    .await?;
    app.client.start_auction(&auction_id).await?;

    let alice_client = app.client_for(alice);
    let bob_client = app.client_for(bob);
    let charlie_client = app.client_for(charlie);

    for round_amounts in [(150, 120, 100), (160, 130, 110), (170, 140, 120)] {
        alice_client.place_bid(&auction_id, round_amounts.0).await?;
        bob_client.place_bid(&auction_id, round_amounts.1).await?;
        charlie_client.place_bid(&auction_id, round_amounts.2).await?;

        #[cfg(feature = "mock-time")]
        {
            app.advance_past_round_end(&auction_id, jiff::Span::new().seconds(1)).await?;
            engine::store::round::complete_round_tx(&auction_id, &app.time_source, &app.db_pool)
                .await?;
        }
    }

    Ok(auction_id)
}
