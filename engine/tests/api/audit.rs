use jiff::Span;
use test_helpers::spawn_app;

#[tokio::test]
async fn audit_balances_with_no_activity() -> anyhow::Result<()> {
    let app = spawn_app().await;
    app.create_user("alice", 1_000).await?;
    app.create_user("bob", 500).await?;

    let report = app.client.audit().await?;
    assert_eq!(report.total_balance, 1_500);
    assert_eq!(report.total_frozen, 0);
    assert_eq!(report.total_active_bid_amount, 0);
    assert_eq!(report.total_won_amount, 0);
    assert!(report.is_valid);
    assert_eq!(report.discrepancy, 0);

    Ok(())
}

#[tokio::test]
async fn audit_reconciles_frozen_balance_with_active_bids() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    app.client_for(alice).place_bid(&auction_id, 150).await?;

    let report = app.client.audit().await?;
    assert_eq!(report.total_balance, 850);
    assert_eq!(report.total_frozen, 150);
    assert_eq!(report.total_active_bid_amount, 150);
    assert!(report.is_valid);

    Ok(())
}

#[tokio::test]
async fn audit_reconciles_after_a_round_completes() -> anyhow::Result<()> {
    let app = spawn_app().await;
    let auction_id = app.create_and_start_auction(1, 5).await?;
    let alice = app.create_user("alice", 1_000).await?;
    app.client_for(alice).place_bid(&auction_id, 150).await?;

    app.advance_past_round_end(&auction_id, Span::new().seconds(1)).await?;
    engine::store::round::complete_round_tx(&auction_id, &app.time_source, &app.db_pool).await?;

    let report = app.client.audit().await?;
    assert_eq!(report.total_balance, 850);
    assert_eq!(report.total_frozen, 0);
    assert_eq!(report.total_won_amount, 150);
    assert!(report.is_valid);

    Ok(())
}
