use payloads::requests;
use reqwest::StatusCode;
use test_helpers::{assert_status_code, spawn_app};

fn single_round(total_items: i32, duration_minutes: i64) -> requests::CreateAuction {
    requests::CreateAuction {
        title: "Office chairs".into(),
        description: Some("Ergonomic chairs, one round".into()),
        total_items,
        rounds_config: vec![payloads::RoundConfig { items_count: total_items, duration_minutes }],
        bidding_params: None,
    }
}

#[tokio::test]
async fn create_and_fetch_auction() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let auction_id = app.client.create_auction(&single_round(2, 5)).await?;
    let auction = app.client.get_auction(&auction_id).await?;

    assert_eq!(auction.id, auction_id);
    assert_eq!(auction.total_items, 2);
    assert_eq!(auction.status, payloads::AuctionStatus::Pending);
    assert_eq!(auction.current_round, 0);

    let auctions = app.client.list_auctions().await?;
    assert!(auctions.iter().any(|a| a.id == auction_id));

    Ok(())
}

#[tokio::test]
async fn rejects_mismatched_rounds_config() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let body = requests::CreateAuction {
        title: "Bad auction".into(),
        description: None,
        total_items: 5,
        rounds_config: vec![payloads::RoundConfig { items_count: 2, duration_minutes: 1 }],
        bidding_params: None,
    };

    assert_status_code(app.client.create_auction(&body).await, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn start_auction_arms_first_round() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let auction_id = app.client.create_auction(&single_round(3, 10)).await?;
    app.client.start_auction(&auction_id).await?;

    let auction = app.client.get_auction(&auction_id).await?;
    assert_eq!(auction.status, payloads::AuctionStatus::Active);
    assert_eq!(auction.current_round, 1);

    let round =
        engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    assert_eq!(round.items_count, 3);
    assert!(!round.completed);

    Ok(())
}

#[tokio::test]
async fn cannot_start_auction_twice() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let auction_id = app.client.create_auction(&single_round(1, 5)).await?;
    app.client.start_auction(&auction_id).await?;

    assert_status_code(app.client.start_auction(&auction_id).await, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn get_unknown_auction_is_not_found() -> anyhow::Result<()> {
    let app = spawn_app().await;

    let bogus = payloads::AuctionId(uuid::Uuid::new_v4());
    assert_status_code(app.client.get_auction(&bogus).await, StatusCode::NOT_FOUND);

    Ok(())
}
