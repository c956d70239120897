//! Auction CRUD and the auction-row CAS primitives shared by the bid and
//! round-completion transactions.

use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use payloads::{
    AuctionId, AuctionStatus, BiddingParams, RoundConfig,
    requests::CreateAuction,
    responses::Auction,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction, types::Json};

use super::StoreError;
use crate::time::TimeSource;

/// Row shape of the `auctions` table. Kept internal: the bidding parameters
/// are stored as flat columns but exposed to callers as `BiddingParams`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct DbAuction {
    pub id: AuctionId,
    pub title: String,
    pub description: Option<String>,
    pub status: AuctionStatus,
    pub total_items: i32,
    pub rounds_config: Json<Vec<RoundConfig>>,
    pub current_round: i32,
    pub min_bid_amount: i64,
    pub min_bid_increment: i64,
    pub anti_sniping_window_ms: i64,
    pub anti_sniping_extension_ms: i64,
    pub max_extensions: i32,
    pub start_time: Option<SqlxTs>,
    pub end_time: Option<SqlxTs>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    pub version: i32,
}

impl DbAuction {
    pub(crate) fn bidding_params(&self) -> BiddingParams {
        BiddingParams {
            min_bid_amount: self.min_bid_amount,
            min_bid_increment: self.min_bid_increment,
            anti_sniping_window_ms: self.anti_sniping_window_ms,
            anti_sniping_extension_ms: self.anti_sniping_extension_ms,
            max_extensions: self.max_extensions,
        }
    }
}

impl TryFrom<DbAuction> for Auction {
    type Error = StoreError;

    fn try_from(db: DbAuction) -> Result<Self, Self::Error> {
        let start_time = db
            .start_time
            .map(Timestamp::try_from)
            .transpose()
            .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
        let end_time = db
            .end_time
            .map(Timestamp::try_from)
            .transpose()
            .map_err(|e| StoreError::Internal(anyhow::anyhow!(e)))?;
        Ok(Auction {
            id: db.id,
            title: db.title,
            description: db.description,
            status: db.status,
            total_items: db.total_items,
            rounds_config: db.rounds_config.0,
            current_round: db.current_round,
            bidding_params: db.bidding_params(),
            start_time,
            end_time,
            created_at: db.created_at,
            version: db.version,
        })
    }
}

/// Validates and persists a new auction in `pending` status.
pub async fn create_auction(
    req: CreateAuction,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Auction, StoreError> {
    if req.total_items < 1 {
        return Err(StoreError::Validation("totalItems must be >= 1".into()));
    }
    if req.rounds_config.is_empty() {
        return Err(StoreError::Validation("roundsConfig must be non-empty".into()));
    }
    let mut items_sum = 0i64;
    for round in &req.rounds_config {
        if round.items_count < 1 {
            return Err(StoreError::Validation(
                "each round must have itemsCount >= 1".into(),
            ));
        }
        if round.duration_minutes < 1 {
            return Err(StoreError::Validation(
                "each round must have durationMinutes >= 1".into(),
            ));
        }
        items_sum += i64::from(round.items_count);
    }
    if items_sum != i64::from(req.total_items) {
        return Err(StoreError::Validation(
            "sum of roundsConfig itemsCount must equal totalItems".into(),
        ));
    }

    let params = req.bidding_params.unwrap_or_default();
    let db: DbAuction = sqlx::query_as(
        r#"
        INSERT INTO auctions
            (title, description, status, total_items, rounds_config, current_round,
             min_bid_amount, min_bid_increment, anti_sniping_window_ms,
             anti_sniping_extension_ms, max_extensions, created_at, version)
        VALUES ($1, $2, 'pending', $3, $4, 0, $5, $6, $7, $8, $9, $10, 0)
        RETURNING *
        "#,
    )
    .bind(req.title)
    .bind(req.description)
    .bind(req.total_items)
    .bind(Json(req.rounds_config))
    .bind(params.min_bid_amount)
    .bind(params.min_bid_increment)
    .bind(params.anti_sniping_window_ms)
    .bind(params.anti_sniping_extension_ms)
    .bind(params.max_extensions)
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await?;

    db.try_into()
}

pub async fn get_auction(auction_id: &AuctionId, pool: &PgPool) -> Result<Auction, StoreError> {
    let db: DbAuction = sqlx::query_as("SELECT * FROM auctions WHERE id = $1")
        .bind(auction_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::auction_not_found(auction_id))?;
    db.try_into()
}

pub async fn list_auctions(
    status: Option<AuctionStatus>,
    pool: &PgPool,
) -> Result<Vec<Auction>, StoreError> {
    let rows: Vec<DbAuction> = match status {
        Some(status) => {
            sqlx::query_as("SELECT * FROM auctions WHERE status = $1 ORDER BY created_at DESC")
                .bind(status)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM auctions ORDER BY created_at DESC")
                .fetch_all(pool)
                .await?
        }
    };
    rows.into_iter().map(Auction::try_from).collect()
}

pub(crate) async fn load_for_update_tx(
    auction_id: &AuctionId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuction, StoreError> {
    sqlx::query_as::<_, DbAuction>("SELECT * FROM auctions WHERE id = $1 FOR UPDATE")
        .bind(auction_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::auction_not_found(auction_id))
}

/// Moves a pending auction to active, arming round 1's timing fields on the
/// auction row itself (the `auction_rounds` row is inserted separately by
/// `store::round::arm_round_tx`).
pub(crate) async fn cas_activate_tx(
    auction: &DbAuction,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuction, StoreError> {
    sqlx::query_as::<_, DbAuction>(
        r#"
        UPDATE auctions
        SET status = 'active', start_time = $1, current_round = 1, version = version + 1
        WHERE id = $2 AND version = $3 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(now.to_sqlx())
    .bind(auction.id)
    .bind(auction.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::InvalidState("auction is not pending".into()))
}

/// Re-reads the auction under the transaction and bumps `version`, requiring
/// `status = active`. Does not change any other field, but serializes
/// concurrent bid/round-completion transactions against each other.
pub(crate) async fn cas_touch_active_tx(
    auction_id: &AuctionId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuction, StoreError> {
    let current = load_for_update_tx(auction_id, tx).await?;
    if current.status != AuctionStatus::Active {
        return Err(StoreError::InvalidState("auction is not active".into()));
    }
    sqlx::query_as::<_, DbAuction>(
        "UPDATE auctions SET version = version + 1 WHERE id = $1 AND version = $2 RETURNING *",
    )
    .bind(auction_id)
    .bind(current.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("auction changed concurrently".into()))
}

pub(crate) async fn cas_advance_round_tx(
    auction: &DbAuction,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuction, StoreError> {
    sqlx::query_as::<_, DbAuction>(
        r#"
        UPDATE auctions SET current_round = current_round + 1, version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING *
        "#,
    )
    .bind(auction.id)
    .bind(auction.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("auction changed concurrently".into()))
}

pub(crate) async fn cas_complete_tx(
    auction: &DbAuction,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbAuction, StoreError> {
    sqlx::query_as::<_, DbAuction>(
        r#"
        UPDATE auctions SET status = 'completed', end_time = $1, version = version + 1
        WHERE id = $2 AND version = $3
        RETURNING *
        "#,
    )
    .bind(now.to_sqlx())
    .bind(auction.id)
    .bind(auction.version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::Conflict("auction changed concurrently".into()))
}

/// Moves a pending auction to active and arms round 1 in a single
/// transaction.
pub async fn start_auction(
    auction_id: &AuctionId,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<Auction, StoreError> {
    let mut tx = pool.begin().await?;
    let current = load_for_update_tx(auction_id, &mut tx).await?;
    if current.status != AuctionStatus::Pending {
        return Err(StoreError::InvalidState("auction is not pending".into()));
    }
    let now = time_source.now();
    let activated = cas_activate_tx(&current, now, &mut tx).await?;
    let round_one = activated
        .rounds_config
        .0
        .first()
        .cloned()
        .ok_or_else(|| StoreError::Internal(anyhow::anyhow!("auction has no rounds configured")))?;
    super::round::arm_round_tx(
        &activated.id,
        1,
        round_one.items_count,
        now,
        now + jiff::Span::new().minutes(round_one.duration_minutes),
        &mut tx,
    )
    .await?;
    tx.commit().await?;
    activated.try_into()
}
