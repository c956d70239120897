use crate::{AuctionId, requests, responses};
use reqwest::StatusCode;
use serde::Serialize;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for interfacing with the auction engine's HTTP surface.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
    /// Sent as `X-User-Id` on every request; auth is a trusted-header stub,
    /// not a real session system.
    pub user_id: Option<crate::UserId>,
}

impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.user_id {
            Some(user_id) => builder.header("X-User-Id", user_id.0.to_string()),
            None => builder,
        }
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.with_auth(self.inner_client.post(self.format_url(path)).json(body))
            .send()
            .await
    }

    async fn empty_post(&self, path: &str) -> ReqwestResult {
        self.with_auth(self.inner_client.post(self.format_url(path)))
            .send()
            .await
    }

    async fn empty_get(&self, path: &str) -> ReqwestResult {
        self.with_auth(self.inner_client.get(self.format_url(path)))
            .send()
            .await
    }
}

impl APIClient {
    pub async fn health_check(&self) -> Result<(), ClientError> {
        let response = self.empty_get("health_check").await?;
        ok_empty(response).await
    }

    pub async fn create_auction(
        &self,
        details: &requests::CreateAuction,
    ) -> Result<AuctionId, ClientError> {
        let response = self.post("auctions", details).await?;
        ok_body(response).await
    }

    pub async fn list_auctions(&self) -> Result<Vec<responses::Auction>, ClientError> {
        let response = self.empty_get("auctions").await?;
        ok_body(response).await
    }

    pub async fn get_auction(
        &self,
        auction_id: &AuctionId,
    ) -> Result<responses::Auction, ClientError> {
        let response = self.empty_get(&format!("auctions/{auction_id}")).await?;
        ok_body(response).await
    }

    pub async fn start_auction(&self, auction_id: &AuctionId) -> Result<(), ClientError> {
        let response = self
            .empty_post(&format!("auctions/{auction_id}/start"))
            .await?;
        ok_empty(response).await
    }

    pub async fn place_bid(
        &self,
        auction_id: &AuctionId,
        amount: i64,
    ) -> Result<responses::PlaceBidResult, ClientError> {
        let response = self
            .post(
                &format!("auctions/{auction_id}/bid"),
                &requests::PlaceBid {
                    auction_id: *auction_id,
                    amount,
                    client_ip: None,
                },
            )
            .await?;
        ok_body(response).await
    }

    pub async fn fast_bid(
        &self,
        auction_id: &AuctionId,
        amount: i64,
    ) -> Result<responses::FastBidResult, ClientError> {
        let response = self
            .post(
                &format!("auctions/{auction_id}/fast-bid"),
                &requests::PlaceBid {
                    auction_id: *auction_id,
                    amount,
                    client_ip: None,
                },
            )
            .await?;
        ok_body(response).await
    }

    pub async fn leaderboard(
        &self,
        auction_id: &AuctionId,
    ) -> Result<responses::LeaderboardResponse, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}/leaderboard"))
            .await?;
        ok_body(response).await
    }

    pub async fn my_bids(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Vec<responses::Bid>, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}/my-bids"))
            .await?;
        ok_body(response).await
    }

    pub async fn min_winning_bid(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Option<i64>, ClientError> {
        let response = self
            .empty_get(&format!("auctions/{auction_id}/min-winning-bid"))
            .await?;
        ok_body(response).await
    }

    pub async fn audit(&self) -> Result<responses::AuditReport, ClientError> {
        let response = self.empty_get("auctions/system/audit").await?;
        ok_body(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An unhandled API error to display, containing response text.
    #[error("{1}")]
    APIError(StatusCode, String),
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

/// Deserialize a successful request into the desired type, or return an
/// appropriate error.
pub async fn ok_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Check that an empty response is OK, returning a ClientError if not.
pub async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
    if !response.status().is_success() {
        return Err(ClientError::APIError(
            response.status(),
            response.text().await?,
        ));
    }
    Ok(())
}
