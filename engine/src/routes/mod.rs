pub mod auction;

use actix_web::{HttpResponse, Responder, ResponseError, body::BoxBody, dev::HttpServiceFactory, get, web};

use crate::store::StoreError;

pub fn api_services() -> impl HttpServiceFactory {
    web::scope("/api")
        .service(health_check)
        .service(auction::create_auction)
        .service(auction::get_auction)
        .service(auction::list_auctions)
        .service(auction::start_auction)
        .service(auction::place_bid)
        .service(auction::fast_bid)
        .service(auction::leaderboard)
        .service(auction::my_bids)
        .service(auction::min_winning_bid)
        .service(auction::audit)
}

#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("healthy")
}

#[derive(Debug, thiserror::Error)]
pub enum APIError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Something went wrong")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for APIError {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::BadRequest(_) => HttpResponse::BadRequest().body(self.to_string()),
            Self::NotFound(_) => HttpResponse::NotFound().body(self.to_string()),
            Self::Conflict(_) => HttpResponse::Conflict().body(self.to_string()),
            Self::UnexpectedError(_) => HttpResponse::InternalServerError().body(self.to_string()),
        }
    }
}

impl From<StoreError> for APIError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => APIError::BadRequest(msg),
            StoreError::NotFound(msg) => APIError::NotFound(msg),
            StoreError::Conflict(msg) => APIError::Conflict(msg),
            StoreError::InvalidState(msg) => APIError::BadRequest(msg),
            StoreError::Database(_) | StoreError::Internal(_) => APIError::UnexpectedError(e.into()),
        }
    }
}

/// Trusted-header user identity extraction. A real deployment would sit
/// this behind an authenticating proxy or session layer; that surface is
/// out of scope here, so requests just carry their caller's id directly.
pub fn get_user_id(req: &actix_web::HttpRequest) -> Result<payloads::UserId, APIError> {
    let header = req
        .headers()
        .get("X-User-Id")
        .ok_or_else(|| APIError::BadRequest("missing X-User-Id header".into()))?;
    let id_str = header
        .to_str()
        .map_err(|_| APIError::BadRequest("X-User-Id header is not valid UTF-8".into()))?;
    let uuid = uuid::Uuid::parse_str(id_str)
        .map_err(|_| APIError::BadRequest("X-User-Id header is not a valid uuid".into()))?;
    Ok(payloads::UserId(uuid))
}
