use std::time::Duration;

use jiff::Span;
use test_helpers::spawn_app;

#[tokio::test]
async fn late_bid_extends_the_round() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 10).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    let before = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;

    // Jump inside the anti-sniping window (5 minutes by default) but before
    // the round actually ends.
    app.time_source.set(before.end_time - Span::new().minutes(1));
    alice_client.place_bid(&auction_id, 150).await?;

    let after = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    assert_eq!(after.extensions_count, 1);
    assert!(after.end_time > before.end_time);

    Ok(())
}

#[tokio::test]
async fn bid_outside_the_window_does_not_extend() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 30).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    alice_client.place_bid(&auction_id, 150).await?;

    let round = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    assert_eq!(round.extensions_count, 0);

    Ok(())
}

#[tokio::test]
async fn extensions_stop_at_max_extensions() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 10).await?;
    let alice = app.create_user("alice", 10_000).await?;
    let alice_client = app.client_for(alice);

    let mut amount = 150;
    for _ in 0..8 {
        let round = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
        app.time_source.set(round.end_time - Span::new().minutes(1));
        alice_client.place_bid(&auction_id, amount).await?;
        amount += 20;
    }

    let round = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    assert_eq!(round.extensions_count, 6);

    Ok(())
}

#[tokio::test]
async fn fast_bid_extends_the_round_through_asynchronous_reconciliation() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 10).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    // Let start_auction's background cache warmup complete.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let before = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    app.time_source.set(before.end_time - Span::new().minutes(1));

    alice_client.fast_bid(&auction_id, 150).await?;

    // The fast path admits synchronously; the anti-sniping extension is a
    // spawned follow-up against the durable store.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = engine::store::round::get_auction_round(&auction_id, 1, &app.db_pool).await?;
    assert_eq!(after.extensions_count, 1);
    assert!(after.end_time > before.end_time);

    Ok(())
}

#[tokio::test]
async fn round_completes_once_time_passes_its_end() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let alice_client = app.client_for(alice);

    alice_client.place_bid(&auction_id, 150).await?;
    app.advance_past_round_end(&auction_id, Span::new().seconds(1)).await?;

    let outcome = engine::store::round::complete_round_tx(&auction_id, &app.time_source, &app.db_pool)
        .await?
        .expect("round should complete");

    assert_eq!(outcome.winners.len(), 1);
    assert!(outcome.auction_completed);

    let auction = app.client.get_auction(&auction_id).await?;
    assert_eq!(auction.status, payloads::AuctionStatus::Completed);

    let (balance, frozen) = app.balance(&alice).await?;
    assert_eq!(balance, 850);
    assert_eq!(frozen, 0);

    Ok(())
}
