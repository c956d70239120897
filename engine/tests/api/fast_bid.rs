use std::time::Duration;

use test_helpers::spawn_app;

#[tokio::test]
async fn fast_bid_falls_back_to_slow_path_when_cache_is_cold() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    // No warmup has had a chance to run against this fresh cache/user pair,
    // so the fast path should transparently redirect through place_bid.
    let result = alice_client.fast_bid(&auction_id, 150).await?;
    assert_eq!(result.status, payloads::AdmitStatus::Ok);
    assert_eq!(result.amount, 150);

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 850);
    assert_eq!(frozen, 150);

    Ok(())
}

#[tokio::test]
async fn fast_bid_admits_once_the_cache_is_warm() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    // Let start_auction's background cache warmup complete.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = alice_client.fast_bid(&auction_id, 150).await?;
    assert_eq!(result.status, payloads::AdmitStatus::Ok);
    assert_eq!(result.rank, Some(1));

    Ok(())
}

#[tokio::test]
async fn fast_bid_above_score_cap_falls_back_to_slow_path() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000_000).await?;
    let alice_client = app.client_for(alice);

    tokio::time::sleep(Duration::from_millis(200)).await;

    // At or above the cap the fast path can't encode a leaderboard score, so
    // it should fall all the way through to the durable transaction instead
    // of admitting an unranked bid.
    let amount = engine::cache::SCORE_AMOUNT_CAP;
    let result = alice_client.fast_bid(&auction_id, amount).await?;
    assert_eq!(result.status, payloads::AdmitStatus::Ok);
    assert_eq!(result.amount, amount);

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 1_000_000 - amount);
    assert_eq!(frozen, amount);

    Ok(())
}

#[tokio::test]
async fn fast_bid_below_min_amount_reports_status_without_mutation() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = alice_client.fast_bid(&auction_id, 1).await?;
    assert_eq!(result.status, payloads::AdmitStatus::MinBid);

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 1_000);
    assert_eq!(frozen, 0);

    Ok(())
}
