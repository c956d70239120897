mod anti_sniping;
mod audit;
mod auction;
mod bidding;
mod fast_bid;
mod leaderboard;

use test_helpers::spawn_app;

#[tokio::test]
async fn health_check() -> anyhow::Result<()> {
    let app = spawn_app().await;

    app.client.health_check().await?;

    Ok(())
}
