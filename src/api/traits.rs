use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::api::types::OfferQuery;
use crate::error::ApiError;
use crate::models::{
    Districts, GeoBounds, OfferDetailResponse, OfferList, OffersPage, PingResponse,
    StartScrapingResponse, StatsResponse, StatusResponse, StreamMessage,
};

/// Frames pushed by `/api/stream`. Ends when the transport drops.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamMessage, ApiError>> + Send>>;

/// Everything the dashboard needs from the backend.
/// This allows swapping the HTTP client for an in-memory one in tests.
#[async_trait]
pub trait RentalApi: Send + Sync {
    async fn districts(&self) -> Result<Districts, ApiError>;

    async fn settings(&self) -> Result<serde_json::Value, ApiError>;

    async fn save_settings(&self, settings: &serde_json::Value) -> Result<serde_json::Value, ApiError>;

    async fn status(&self) -> Result<StatusResponse, ApiError>;

    /// Paginated offer list. The only call that is cut off by a timeout.
    async fn offers(&self, query: &OfferQuery) -> Result<OffersPage, ApiError>;

    /// Unbounded offer set for the map.
    async fn offers_map(&self) -> Result<OfferList, ApiError>;

    async fn offers_nearby(&self, bounds: GeoBounds, limit: u32) -> Result<OfferList, ApiError>;

    async fn ping_visible(&self, links: &[String]) -> Result<PingResponse, ApiError>;

    async fn start_scraping(&self) -> Result<StartScrapingResponse, ApiError>;

    async fn offer_detail(&self, link: &str, scraper: &str) -> Result<OfferDetailResponse, ApiError>;

    async fn stats(&self) -> Result<StatsResponse, ApiError>;

    async fn clear_cache(&self) -> Result<serde_json::Value, ApiError>;

    async fn cleanup_cache(&self) -> Result<serde_json::Value, ApiError>;

    async fn cache_stats(&self) -> Result<serde_json::Value, ApiError>;

    /// Open the server-push channel.
    async fn stream(&self) -> Result<EventStream, ApiError>;
}
