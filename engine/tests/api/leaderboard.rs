use test_helpers::spawn_app;

#[tokio::test]
async fn leaderboard_ranks_by_amount_then_creation_order() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(2, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let bob = app.create_user("bob", 1_000).await?;
    let charlie = app.create_user("charlie", 1_000).await?;

    app.client_for(alice).place_bid(&auction_id, 150).await?;
    app.client_for(bob).place_bid(&auction_id, 200).await?;
    app.client_for(charlie).place_bid(&auction_id, 120).await?;

    let board = app.leaderboard(&auction_id).await?;
    assert_eq!(board.active.len(), 3);
    assert_eq!(board.active[0].user_id, bob);
    assert_eq!(board.active[1].user_id, alice);
    assert_eq!(board.active[2].user_id, charlie);

    // Two items are up for this round: bob and alice are winning, charlie
    // is not.
    assert!(board.active[0].is_winning);
    assert!(board.active[1].is_winning);
    assert!(!board.active[2].is_winning);

    assert!(board.past_winners.is_empty());

    Ok(())
}

#[tokio::test]
async fn leaderboard_pagination_respects_limit_and_offset() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;

    for (name, amount) in [("a", 150), ("b", 200), ("c", 120), ("d", 300)] {
        let user = app.create_user(name, 1_000).await?;
        app.client_for(user).place_bid(&auction_id, amount).await?;
    }

    let page = app
        .client
        .leaderboard(&auction_id)
        .await?;
    assert_eq!(page.active.len(), 4);

    Ok(())
}

#[tokio::test]
async fn my_bids_returns_only_the_caller_bid_history() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    let bob = app.create_user("bob", 1_000).await?;

    let alice_client = app.client_for(alice);
    let bob_client = app.client_for(bob);
    alice_client.place_bid(&auction_id, 150).await?;
    alice_client.place_bid(&auction_id, 180).await?;
    bob_client.place_bid(&auction_id, 160).await?;

    let mine = alice_client.my_bids(&auction_id).await?;
    assert!(mine.iter().all(|b| b.user_id == alice));
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].amount, 180);

    Ok(())
}
