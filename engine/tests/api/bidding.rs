use reqwest::StatusCode;
use test_helpers::{assert_status_code, spawn_app};

#[tokio::test]
async fn place_bid_freezes_balance() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    let result = alice_client.place_bid(&auction_id, 150).await?;
    assert_eq!(result.bid.amount, 150);
    assert_eq!(result.bid.user_id, alice);

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 850);
    assert_eq!(frozen, 150);

    Ok(())
}

#[tokio::test]
async fn raising_own_bid_only_freezes_the_delta() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    alice_client.place_bid(&auction_id, 150).await?;
    alice_client.place_bid(&auction_id, 200).await?;

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 800);
    assert_eq!(frozen, 200);

    Ok(())
}

#[tokio::test]
async fn bid_below_min_bid_amount_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    assert_status_code(alice_client.place_bid(&auction_id, 1).await, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn bid_exceeding_balance_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 100).await?;
    let alice_client = app.client_for(alice);

    assert_status_code(alice_client.place_bid(&auction_id, 500).await, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn duplicate_bid_amount_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(2, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let bob = app.create_user("bob", 1_000).await?;
    let alice_client = app.client_for(alice);
    let bob_client = app.client_for(bob);

    alice_client.place_bid(&auction_id, 150).await?;
    assert_status_code(bob_client.place_bid(&auction_id, 150).await, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn outbid_user_is_surfaced_in_leaderboard() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let bob = app.create_user("bob", 1_000).await?;
    let alice_client = app.client_for(alice);
    let bob_client = app.client_for(bob);

    alice_client.place_bid(&auction_id, 150).await?;
    bob_client.place_bid(&auction_id, 200).await?;

    let board = app.leaderboard(&auction_id).await?;
    assert_eq!(board.active.len(), 2);
    let top = board.active.iter().find(|e| e.user_id == bob).unwrap();
    assert!(top.is_winning);
    let bottom = board.active.iter().find(|e| e.user_id == alice).unwrap();
    assert!(!bottom.is_winning);

    Ok(())
}

#[tokio::test]
async fn unauthenticated_bid_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;

    assert_status_code(app.client.place_bid(&auction_id, 150).await, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn min_winning_bid_reflects_current_standing() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    let before = app.min_winning_bid(&auction_id).await?;
    assert_eq!(before, Some(100));

    alice_client.place_bid(&auction_id, 150).await?;

    let after = app.min_winning_bid(&auction_id).await?;
    assert_eq!(after, Some(160));

    Ok(())
}
