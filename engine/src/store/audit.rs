//! Invariant audit query: reconciles the ledger against outstanding bids.

use payloads::responses::AuditReport;
use sqlx::PgPool;

use super::StoreError;

/// Computes the global invariant check: `Σ frozenBalance` should equal
/// `Σ active-bid amount`; `discrepancy = Σ frozen − Σ active`.
pub async fn audit(pool: &PgPool) -> Result<AuditReport, StoreError> {
    let (total_balance, total_frozen) = super::user::sum_balances(pool).await?;
    let total_won_amount = super::bid::sum_won_bid_amounts(pool).await?;
    let total_active_bid_amount = super::bid::sum_active_bid_amounts(pool).await?;
    let discrepancy = total_frozen - total_active_bid_amount;
    let is_valid = discrepancy == 0 && total_balance >= 0 && total_frozen >= 0;

    Ok(AuditReport {
        total_balance,
        total_frozen,
        total_won_amount,
        total_active_bid_amount,
        discrepancy,
        is_valid,
    })
}
