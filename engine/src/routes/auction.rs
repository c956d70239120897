use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use payloads::{AuctionId, AuctionStatus, requests::CreateAuction};
use serde::Deserialize;

use crate::routes::{APIError, get_user_id};
use crate::service::AuctionService;

#[tracing::instrument(skip(service), ret)]
#[post("/auctions")]
pub async fn create_auction(
    body: web::Json<CreateAuction>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let auction = service.create_auction(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[derive(Debug, Deserialize)]
pub struct ListAuctionsQuery {
    pub status: Option<AuctionStatus>,
}

#[tracing::instrument(skip(service), ret)]
#[get("/auctions")]
pub async fn list_auctions(
    query: web::Query<ListAuctionsQuery>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let auctions = service.list_auctions(query.status).await?;
    Ok(HttpResponse::Ok().json(auctions))
}

#[tracing::instrument(skip(service), ret)]
#[get("/auctions/{auction_id}")]
pub async fn get_auction(
    auction_id: web::Path<AuctionId>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let auction = service.get_auction(&auction_id).await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[tracing::instrument(skip(service), ret)]
#[post("/auctions/{auction_id}/start")]
pub async fn start_auction(
    auction_id: web::Path<AuctionId>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let auction = service.start_auction(&auction_id).await?;
    Ok(HttpResponse::Ok().json(auction))
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidBody {
    pub amount: i64,
}

fn client_ip(req: &HttpRequest) -> Option<std::net::IpAddr> {
    req.peer_addr().map(|addr| addr.ip())
}

#[tracing::instrument(skip(req, service), ret)]
#[post("/auctions/{auction_id}/bid")]
pub async fn place_bid(
    req: HttpRequest,
    auction_id: web::Path<AuctionId>,
    body: web::Json<PlaceBidBody>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&req)?;
    let result = service
        .place_bid(&auction_id, &user_id, body.amount, client_ip(&req))
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[tracing::instrument(skip(req, service), ret)]
#[post("/auctions/{auction_id}/fast-bid")]
pub async fn fast_bid(
    req: HttpRequest,
    auction_id: web::Path<AuctionId>,
    body: web::Json<PlaceBidBody>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&req)?;
    let result = service
        .fast_bid(&auction_id, &user_id, body.amount, client_ip(&req))
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQueryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[tracing::instrument(skip(service), ret)]
#[get("/auctions/{auction_id}/leaderboard")]
pub async fn leaderboard(
    auction_id: web::Path<AuctionId>,
    query: web::Query<LeaderboardQueryParams>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);
    let result = service.leaderboard(&auction_id, limit, offset).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[tracing::instrument(skip(req, service), ret)]
#[get("/auctions/{auction_id}/my-bids")]
pub async fn my_bids(
    req: HttpRequest,
    auction_id: web::Path<AuctionId>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&req)?;
    let bids = service.my_bids(&auction_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(bids))
}

#[tracing::instrument(skip(service), ret)]
#[get("/auctions/{auction_id}/min-winning-bid")]
pub async fn min_winning_bid(
    auction_id: web::Path<AuctionId>,
    service: web::Data<Arc<AuctionService>>,
) -> Result<HttpResponse, APIError> {
    let amount = service.min_winning_bid(&auction_id).await?;
    Ok(HttpResponse::Ok().json(amount))
}

#[tracing::instrument(skip(service), ret)]
#[get("/auctions/system/audit")]
pub async fn audit(service: web::Data<Arc<AuctionService>>) -> Result<HttpResponse, APIError> {
    let report = service.audit().await?;
    Ok(HttpResponse::Ok().json(report))
}
