use serde::{Deserialize, Serialize};

use crate::models::MAX_PAGE_LIMIT;

/// Query parameters for `GET /api/offers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferQuery {
    /// District name, e.g. "Praha 5"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub page: u32,
    /// Offers per page, never above 500
    pub limit: u32,
    /// Backend sort key ("price-asc", "newest", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl Default for OfferQuery {
    fn default() -> Self {
        Self {
            district: None,
            page: 1,
            limit: MAX_PAGE_LIMIT,
            sort: None,
        }
    }
}

impl OfferQuery {
    /// Newest-first page used while a scrape is running.
    pub fn newest(limit: u32) -> Self {
        Self {
            limit: limit.min(MAX_PAGE_LIMIT),
            sort: Some("newest".to_string()),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}
