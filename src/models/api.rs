//! Request and response bodies of the dashboard backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{GeoBounds, LatLng, Offer};

/// Hard upper bound the backend accepts for `limit`.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Server-side pagination, replaced wholesale by every list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_count: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: MAX_PAGE_LIMIT,
            total_count: 0,
            total_pages: 0,
            has_next: false,
            has_prev: false,
        }
    }
}

/// `GET /api/offers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OffersPage {
    pub offers: Vec<Offer>,
    pub pagination: Option<Pagination>,
    pub active_count: Option<u64>,
    pub expanded_districts: Vec<String>,
}

/// `GET /api/offers-map` and `POST /api/offers-nearby`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OfferList {
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyRequest {
    pub bounds: GeoBounds,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingResult {
    pub link: String,
    pub is_valid: bool,
    #[serde(default)]
    pub ping_time: Option<String>,
}

/// `POST /api/ping-visible`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PingResponse {
    pub success: bool,
    pub results: Vec<PingResult>,
    pub invalid_count: u32,
}

/// `GET /api/status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub fetching_status: Option<String>,
    pub valid_count: Option<u64>,
    pub cache_count: Option<u64>,
    pub last_update: Option<String>,
    pub user_start_choice: Option<String>,
}

impl StatusResponse {
    /// `valid_count`, or `cache_count` when the former is missing or zero.
    pub fn offer_count(&self) -> u64 {
        self.valid_count
            .filter(|count| *count > 0)
            .or(self.cache_count)
            .unwrap_or(0)
    }

    /// The operator picked "quick start" and doesn't want an automatic scrape.
    pub fn is_quick_start(&self) -> bool {
        self.user_start_choice.as_deref() == Some("1")
    }
}

/// `POST /api/start-scraping`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartScrapingResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl StartScrapingResponse {
    pub fn already_running(&self) -> bool {
        self.message
            .as_deref()
            .is_some_and(|message| message.contains("již běží"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferDetailRequest {
    pub link: String,
    pub scraper: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OfferDetail {
    pub description: Option<String>,
    pub images: Vec<String>,
}

/// `POST /api/offer-detail`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OfferDetailResponse {
    pub success: bool,
    pub detail: Option<OfferDetail>,
}

/// `GET /api/stats`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatsResponse {
    pub by_scraper: BTreeMap<String, u64>,
}

/// `GET /api/districts`: district name to its centre.
pub type Districts = BTreeMap<String, LatLng>;

/// One frame of `/api/stream`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
