//! In-memory doubles shared by the unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::api::{EventStream, OfferQuery, RentalApi};
use crate::error::ApiError;
use crate::map::{MapView, MarkerGroup, Popup};
use crate::models::{
    Districts, GeoBounds, Offer, OfferDetail, OfferDetailResponse, OfferList, OffersPage,
    PingResponse, PingResult, StartScrapingResponse, StatsResponse, StatusResponse, StreamMessage,
};
use crate::notify::{Notification, NotificationSink};
use crate::ui::render::{EmptyState, FilterTag, OfferCard, OfferModal, Renderer};

fn offline(endpoint: &str) -> ApiError {
    ApiError::Network {
        endpoint: endpoint.to_string(),
        reason: "connection refused".to_string(),
        connect: true,
    }
}

#[derive(Default)]
struct FakeState {
    statuses: VecDeque<StatusResponse>,
    status_down: bool,
    pages: VecDeque<OffersPage>,
    offer_queries: Vec<OfferQuery>,
    offers_time_out: bool,
    map_offers: Vec<Offer>,
    nearby: Vec<Offer>,
    nearby_requests: Vec<(GeoBounds, u32)>,
    ping_overrides: Vec<PingResult>,
    pings_fail: bool,
    ping_requests: Vec<Vec<String>>,
    start_response: Option<StartScrapingResponse>,
    start_calls: usize,
    districts: Districts,
    detail: Option<OfferDetail>,
    stats: StatsResponse,
    stream: Option<Vec<StreamMessage>>,
    stream_opens: usize,
}

/// Scriptable backend. Queued statuses and pages are served in order, the
/// last one repeating once the queue is down to it.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn push_status(&self, status: StatusResponse) {
        self.state.lock().statuses.push_back(status);
    }

    pub fn set_status_down(&self, down: bool) {
        self.state.lock().status_down = down;
    }

    pub fn push_page(&self, offers: Vec<Offer>) {
        let total_count = offers.len() as u64;
        self.push_offers_page(OffersPage {
            offers,
            pagination: Some(crate::models::Pagination {
                total_count,
                ..Default::default()
            }),
            ..OffersPage::default()
        });
    }

    pub fn push_offers_page(&self, page: OffersPage) {
        self.state.lock().pages.push_back(page);
    }

    pub fn offer_queries(&self) -> Vec<OfferQuery> {
        self.state.lock().offer_queries.clone()
    }

    /// Make every list request time out.
    pub fn time_out_offers(&self, time_out: bool) {
        self.state.lock().offers_time_out = time_out;
    }

    pub fn set_map_offers(&self, offers: Vec<Offer>) {
        self.state.lock().map_offers = offers;
    }

    pub fn set_nearby(&self, offers: Vec<Offer>) {
        self.state.lock().nearby = offers;
    }

    pub fn nearby_requests(&self) -> Vec<(GeoBounds, u32)> {
        self.state.lock().nearby_requests.clone()
    }

    /// Override the verdict for one link; every other link comes back valid.
    pub fn set_ping_result(&self, result: PingResult) {
        self.state.lock().ping_overrides.push(result);
    }

    pub fn fail_pings(&self, fail: bool) {
        self.state.lock().pings_fail = fail;
    }

    pub fn ping_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().ping_requests.clone()
    }

    pub fn set_start_response(&self, response: StartScrapingResponse) {
        self.state.lock().start_response = Some(response);
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    pub fn set_districts(&self, districts: Districts) {
        self.state.lock().districts = districts;
    }

    pub fn set_detail(&self, detail: OfferDetail) {
        self.state.lock().detail = Some(detail);
    }

    pub fn set_stats(&self, stats: StatsResponse) {
        self.state.lock().stats = stats;
    }

    /// Frames for the first stream opened. Later opens end immediately.
    pub fn set_stream(&self, messages: Vec<StreamMessage>) {
        self.state.lock().stream = Some(messages);
    }

    pub fn stream_opens(&self) -> usize {
        self.state.lock().stream_opens
    }
}

fn next_or_last<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl RentalApi for FakeApi {
    async fn districts(&self) -> Result<Districts, ApiError> {
        Ok(self.state.lock().districts.clone())
    }

    async fn settings(&self) -> Result<Value, ApiError> {
        Ok(json!({}))
    }

    async fn save_settings(&self, settings: &Value) -> Result<Value, ApiError> {
        Ok(settings.clone())
    }

    async fn status(&self) -> Result<StatusResponse, ApiError> {
        let mut state = self.state.lock();
        if state.status_down {
            return Err(offline("api/status"));
        }
        Ok(next_or_last(&mut state.statuses).unwrap_or_default())
    }

    async fn offers(&self, query: &OfferQuery) -> Result<OffersPage, ApiError> {
        let mut state = self.state.lock();
        state.offer_queries.push(query.clone());
        if state.offers_time_out {
            return Err(ApiError::Timeout {
                endpoint: "api/offers".to_string(),
            });
        }
        Ok(next_or_last(&mut state.pages).unwrap_or_default())
    }

    async fn offers_map(&self) -> Result<OfferList, ApiError> {
        Ok(OfferList {
            offers: self.state.lock().map_offers.clone(),
        })
    }

    async fn offers_nearby(&self, bounds: GeoBounds, limit: u32) -> Result<OfferList, ApiError> {
        let mut state = self.state.lock();
        state.nearby_requests.push((bounds, limit));
        Ok(OfferList {
            offers: state.nearby.clone(),
        })
    }

    async fn ping_visible(&self, links: &[String]) -> Result<PingResponse, ApiError> {
        let mut state = self.state.lock();
        state.ping_requests.push(links.to_vec());
        if state.pings_fail {
            return Err(offline("api/ping-visible"));
        }

        let results: Vec<PingResult> = links
            .iter()
            .map(|link| {
                state
                    .ping_overrides
                    .iter()
                    .find(|result| &result.link == link)
                    .cloned()
                    .unwrap_or_else(|| PingResult {
                        link: link.clone(),
                        is_valid: true,
                        ping_time: Some("2025-03-01T12:00:00".to_string()),
                    })
            })
            .collect();
        let invalid_count = results.iter().filter(|result| !result.is_valid).count() as u32;
        Ok(PingResponse {
            success: true,
            results,
            invalid_count,
        })
    }

    async fn start_scraping(&self) -> Result<StartScrapingResponse, ApiError> {
        let mut state = self.state.lock();
        state.start_calls += 1;
        Ok(state.start_response.clone().unwrap_or(StartScrapingResponse {
            success: true,
            message: None,
        }))
    }

    async fn offer_detail(&self, _link: &str, _scraper: &str) -> Result<OfferDetailResponse, ApiError> {
        let detail = self.state.lock().detail.clone();
        Ok(OfferDetailResponse {
            success: detail.is_some(),
            detail,
        })
    }

    async fn stats(&self) -> Result<StatsResponse, ApiError> {
        Ok(self.state.lock().stats.clone())
    }

    async fn clear_cache(&self) -> Result<Value, ApiError> {
        Ok(json!({"success": true}))
    }

    async fn cleanup_cache(&self) -> Result<Value, ApiError> {
        Ok(json!({"success": true}))
    }

    async fn cache_stats(&self) -> Result<Value, ApiError> {
        Ok(json!({}))
    }

    async fn stream(&self) -> Result<EventStream, ApiError> {
        let mut state = self.state.lock();
        state.stream_opens += 1;
        let messages = state.stream.take().unwrap_or_default();
        Ok(Box::pin(futures_util::stream::iter(messages.into_iter().map(Ok))))
    }
}

pub struct NullSink;

impl NotificationSink for NullSink {
    fn show(&self, _notification: &Notification) {}
}

/// Notifications in the order they were shown.
#[derive(Default)]
pub struct RecordingSink {
    pub shown: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.shown.lock().iter().map(|n| n.message.clone()).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) {
        self.shown.lock().push(notification.clone());
    }
}

/// Everything a renderer was asked to show.
#[derive(Debug, Default)]
pub struct RenderLog {
    pub lists: Vec<Vec<OfferCard>>,
    pub appended: Vec<Vec<OfferCard>>,
    pub empties: Vec<EmptyState>,
    pub errors: Vec<(String, bool)>,
    pub active_counts: Vec<String>,
    pub filters: Vec<Vec<FilterTag>>,
    pub titles: Vec<String>,
    pub maps: Vec<usize>,
    pub popups: Vec<Popup>,
    pub modals: Vec<OfferModal>,
    pub indicators: Vec<Option<String>>,
    pub scrapers: Vec<String>,
    pub loading: Vec<bool>,
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub log: Mutex<RenderLog>,
}

impl Renderer for RecordingRenderer {
    fn render_list(&self, cards: &[OfferCard]) {
        self.log.lock().lists.push(cards.to_vec());
    }

    fn append_cards(&self, cards: &[OfferCard]) {
        self.log.lock().appended.push(cards.to_vec());
    }

    fn render_empty(&self, state: &EmptyState) {
        self.log.lock().empties.push(state.clone());
    }

    fn render_error(&self, message: &str, recoverable: bool) {
        self.log.lock().errors.push((message.to_string(), recoverable));
    }

    fn set_loading(&self, loading: bool) {
        self.log.lock().loading.push(loading);
    }

    fn set_active_count(&self, text: &str) {
        self.log.lock().active_counts.push(text.to_string());
    }

    fn set_active_filters(&self, tags: &[FilterTag]) {
        self.log.lock().filters.push(tags.to_vec());
    }

    fn set_panel_title(&self, title: &str) {
        self.log.lock().titles.push(title.to_string());
    }

    fn render_map(&self, markers: &[MarkerGroup], _view: &MapView) {
        self.log.lock().maps.push(markers.len());
    }

    fn show_popup(&self, popup: &Popup) {
        self.log.lock().popups.push(popup.clone());
    }

    fn show_modal(&self, modal: &OfferModal) {
        self.log.lock().modals.push(modal.clone());
    }

    fn set_processing_indicator(&self, text: Option<&str>) {
        self.log.lock().indicators.push(text.map(str::to_string));
    }

    fn set_scraper_options(&self, scrapers: &[String]) {
        self.log.lock().scrapers = scrapers.to_vec();
    }
}
