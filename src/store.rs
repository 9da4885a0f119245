//! In-memory offer state: the paginated list, the unbounded map set, the
//! offers in the map viewport, the filtered view with its infinite-scroll
//! cursor and the ping cache.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::api::OfferQuery;
use crate::filter::{self, FilterCriteria};
use crate::models::{OffersPage, Pagination, Offer, PingResponse};

pub type SharedStore = Arc<Mutex<OfferStore>>;

/// Identifies one list request. Only the most recent token may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadToken(u64);

/// What changed after a list response was applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub previous_count: usize,
    pub loaded: usize,
    pub expanded_districts: Vec<String>,
}

/// What changed after a ping batch came back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingOutcome {
    pub updated: usize,
    /// Links reported gone upstream
    pub removed: Vec<String>,
}

#[derive(Debug)]
pub struct OfferStore {
    current: Vec<Offer>,
    map_offers: Vec<Offer>,
    /// Offers inside the map viewport while the list shows them instead of
    /// `current`
    viewport: Option<Vec<Offer>>,
    filtered: Vec<Offer>,
    displayed: usize,
    page_size: usize,
    page_limit: u32,
    pagination: Pagination,
    active_count: Option<u64>,
    pinged: HashSet<String>,
    token: u64,
    selected_district: Option<String>,
    criteria: FilterCriteria,
}

impl Default for OfferStore {
    fn default() -> Self {
        Self::new(50, crate::models::MAX_PAGE_LIMIT)
    }
}

/// Keep the first offer per link, dropping offers that have none.
fn dedup_by_link(offers: Vec<Offer>) -> Vec<Offer> {
    let mut seen = HashSet::new();
    offers
        .into_iter()
        .filter(|offer| offer.key().is_some_and(|key| seen.insert(key.to_string())))
        .collect()
}

impl OfferStore {
    pub fn new(page_size: usize, page_limit: u32) -> Self {
        Self {
            current: Vec::new(),
            map_offers: Vec::new(),
            viewport: None,
            filtered: Vec::new(),
            displayed: 0,
            page_size: page_size.max(1),
            page_limit,
            pagination: Pagination::default(),
            active_count: None,
            pinged: HashSet::new(),
            token: 0,
            selected_district: None,
            criteria: FilterCriteria::default(),
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Start a list request for `district`. Any response still in flight
    /// becomes stale.
    pub fn begin_load(&mut self, district: Option<String>) -> (LoadToken, OfferQuery) {
        self.token += 1;
        self.selected_district = district.clone();
        let query = OfferQuery {
            district,
            page: 1,
            limit: self.page_limit,
            sort: self.criteria.sort.as_query().map(str::to_string),
        };
        (LoadToken(self.token), query)
    }

    pub fn is_current(&self, token: LoadToken) -> bool {
        token.0 == self.token
    }

    /// Apply a list response. Returns `None` when a newer load was started
    /// after `token` was issued.
    pub fn apply_page(
        &mut self,
        token: LoadToken,
        page: OffersPage,
        reset_pagination: bool,
    ) -> Option<LoadOutcome> {
        if !self.is_current(token) {
            debug!(token = token.0, latest = self.token, "Discarding stale offer page");
            return None;
        }

        let previous_count = self.current.len();
        let loaded = page.offers.len();

        if let Some(pagination) = page.pagination {
            self.pagination = pagination;
        }
        self.active_count = page.active_count.filter(|count| *count > 0);

        if reset_pagination {
            self.current = dedup_by_link(page.offers);
        } else {
            self.append_new(page.offers);
        }
        self.viewport = None;
        self.refresh_view();

        Some(LoadOutcome {
            previous_count,
            loaded,
            expanded_districts: page.expanded_districts,
        })
    }

    fn append_new(&mut self, offers: Vec<Offer>) -> usize {
        let mut known: HashSet<String> = self.links();
        let before = self.current.len();
        for offer in offers {
            if let Some(key) = offer.key() {
                if known.insert(key.to_string()) {
                    self.current.push(offer);
                }
            }
        }
        self.current.len() - before
    }

    fn links(&self) -> HashSet<String> {
        self.current
            .iter()
            .filter_map(Offer::key)
            .map(str::to_string)
            .collect()
    }

    /// Offers the list view is built from.
    fn list_source(&self) -> &[Offer] {
        self.viewport.as_deref().unwrap_or(&self.current)
    }

    /// Recompute the filtered view and rewind the scroll cursor to one page.
    pub fn refresh_view(&mut self) {
        self.filtered = filter::apply(self.list_source(), &self.criteria);
        self.displayed = self.page_size.min(self.filtered.len());
    }

    /// Recompute the filtered view but keep already revealed cards revealed.
    fn refilter(&mut self) {
        self.filtered = filter::apply(self.list_source(), &self.criteria);
        self.displayed = self
            .displayed
            .max(self.page_size)
            .min(self.filtered.len());
    }

    /// Show `offers` (the map viewport) in the list instead of the loaded
    /// offers, without touching `current`. Lasts until the next list page.
    pub fn set_sidebar_offers(&mut self, offers: &[Offer]) {
        self.viewport = Some(dedup_by_link(offers.to_vec()));
        self.refresh_view();
    }

    /// Go back to listing the loaded offers.
    pub fn clear_sidebar_offers(&mut self) {
        if self.viewport.take().is_some() {
            self.refresh_view();
        }
    }

    pub fn shows_viewport(&self) -> bool {
        self.viewport.is_some()
    }

    /// Reveal the next page of the filtered view. `None` once exhausted.
    pub fn load_more(&mut self) -> Option<&[Offer]> {
        if self.displayed >= self.filtered.len() {
            return None;
        }
        let start = self.displayed;
        self.displayed = (start + self.page_size).min(self.filtered.len());
        Some(&self.filtered[start..self.displayed])
    }

    /// Offers in `visible` worth pinging, capped at `batch_size`, list order.
    pub fn ping_candidates(&self, visible: &[Offer], batch_size: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        visible
            .iter()
            .filter(|offer| offer.last_ping_is_valid.is_none())
            .filter_map(Offer::key)
            .filter(|link| !self.pinged.contains(*link))
            .filter(|link| seen.insert(*link))
            .take(batch_size)
            .map(str::to_string)
            .collect()
    }

    pub fn is_pinged(&self, link: &str) -> bool {
        self.pinged.contains(link)
    }

    /// Merge a ping batch: cache every returned link, copy validity onto the
    /// list and map offers, drop dead offers from the list.
    pub fn apply_ping_results(&mut self, response: &PingResponse) -> PingOutcome {
        let mut outcome = PingOutcome::default();

        for result in &response.results {
            self.pinged.insert(result.link.clone());

            for offer in self
                .current
                .iter_mut()
                .chain(self.map_offers.iter_mut())
                .chain(self.viewport.iter_mut().flatten())
                .filter(|offer| offer.key() == Some(result.link.as_str()))
            {
                offer.last_ping_is_valid = Some(result.is_valid);
                if let Some(ping_time) = &result.ping_time {
                    offer.last_ping = Some(ping_time.clone());
                }
                outcome.updated += 1;
            }

            if !result.is_valid {
                outcome.removed.push(result.link.clone());
            }
        }

        if !outcome.removed.is_empty() {
            let alive = |offer: &Offer| offer.key().map_or(true, |key| !outcome.removed.iter().any(|r| r == key));
            self.current.retain(alive);
            if let Some(viewport) = self.viewport.as_mut() {
                viewport.retain(alive);
            }
        }
        self.refilter();
        outcome
    }

    /// Put offers whose link isn't held yet in front of the list (and the map
    /// set). A viewport list keeps showing the viewport. Returns the genuinely
    /// new ones.
    pub fn prepend_new(&mut self, offers: Vec<Offer>) -> Vec<Offer> {
        let known = self.links();
        let fresh: Vec<Offer> = dedup_by_link(offers)
            .into_iter()
            .filter(|offer| offer.key().is_some_and(|key| !known.contains(key)))
            .collect();
        if fresh.is_empty() {
            return fresh;
        }

        let mut current = fresh.clone();
        current.append(&mut self.current);
        self.current = current;

        if !self.map_offers.is_empty() {
            let map_known: HashSet<&str> = self.map_offers.iter().filter_map(Offer::key).collect();
            let mut map_offers: Vec<Offer> = fresh
                .iter()
                .filter(|offer| offer.key().is_some_and(|key| !map_known.contains(key)))
                .cloned()
                .collect();
            map_offers.append(&mut self.map_offers);
            self.map_offers = map_offers;
        }

        self.refilter();
        fresh
    }

    /// Append nearby offers not held yet, to the viewport list too when one
    /// is shown. Returns how many were new to the loaded list.
    pub fn merge_nearby(&mut self, offers: Vec<Offer>) -> usize {
        let mut changed = false;
        if let Some(viewport) = self.viewport.as_mut() {
            let mut known: HashSet<String> = viewport.iter().filter_map(Offer::key).map(str::to_string).collect();
            for offer in &offers {
                if offer.key().is_some_and(|key| known.insert(key.to_string())) {
                    viewport.push(offer.clone());
                    changed = true;
                }
            }
        }
        let added = self.append_new(offers);
        if added > 0 || changed {
            self.refresh_view();
        }
        added
    }

    /// Look an offer up by link in the list view, the list and the map set.
    pub fn offer_by_link(&self, link: &str) -> Option<&Offer> {
        self.filtered
            .iter()
            .chain(self.current.iter())
            .chain(self.map_offers.iter())
            .chain(self.viewport.iter().flatten())
            .find(|offer| offer.key() == Some(link))
    }

    /// Store a description fetched on demand wherever the offer is held.
    pub fn set_description(&mut self, link: &str, description: &str) {
        for offer in self
            .current
            .iter_mut()
            .chain(self.map_offers.iter_mut())
            .chain(self.viewport.iter_mut().flatten())
            .chain(self.filtered.iter_mut())
            .filter(|offer| offer.key() == Some(link))
        {
            offer.description = Some(description.to_string());
        }
    }

    pub fn set_map_offers(&mut self, offers: Vec<Offer>) {
        self.map_offers = dedup_by_link(offers);
    }

    /// Offers the map is built from: the map set, or the list when the map
    /// set couldn't be loaded.
    pub fn map_source(&self) -> &[Offer] {
        if self.map_offers.is_empty() {
            &self.current
        } else {
            &self.map_offers
        }
    }

    /// Map offers passing the current filters.
    pub fn filtered_map_offers(&self) -> Vec<Offer> {
        filter::apply(self.map_source(), &self.criteria)
    }

    /// Cards currently revealed in the list.
    pub fn visible(&self) -> &[Offer] {
        &self.filtered[..self.displayed]
    }

    pub fn current(&self) -> &[Offer] {
        &self.current
    }

    pub fn filtered(&self) -> &[Offer] {
        &self.filtered
    }

    pub fn displayed_count(&self) -> usize {
        self.displayed
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Total for the count label: the backend's active count, its
    /// pagination total, else the filtered length.
    pub fn total_count(&self) -> u64 {
        self.active_count
            .or(Some(self.pagination.total_count).filter(|total| *total > 0))
            .unwrap_or(self.filtered.len() as u64)
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.refresh_view();
    }

    pub fn selected_district(&self) -> Option<&str> {
        self.selected_district.as_deref()
    }

    pub fn set_selected_district(&mut self, district: Option<String>) {
        self.selected_district = district;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Price, PingResult};

    fn offer(link: &str) -> Offer {
        Offer {
            link: Some(link.to_string()),
            title: format!("Byt {link}"),
            price: Price::from("15 000 Kč"),
            ..Offer::default()
        }
    }

    fn page(links: &[&str]) -> OffersPage {
        OffersPage {
            offers: links.iter().map(|link| offer(link)).collect(),
            pagination: Some(Pagination {
                total_count: links.len() as u64,
                ..Pagination::default()
            }),
            ..OffersPage::default()
        }
    }

    #[test]
    fn test_stale_response_is_discarded() {
        let mut store = OfferStore::default();
        let (first, _) = store.begin_load(None);
        let (second, query) = store.begin_load(Some("Praha 2".to_string()));
        assert_eq!(query.district.as_deref(), Some("Praha 2"));

        assert!(store.apply_page(second, page(&["b"]), true).is_some());
        assert!(store.apply_page(first, page(&["a1", "a2"]), true).is_none());
        assert_eq!(store.current().len(), 1);
        assert_eq!(store.current()[0].key(), Some("b"));
    }

    #[test]
    fn test_load_more_exhausts_without_duplicates() {
        let mut store = OfferStore::new(50, 500);
        let links: Vec<String> = (0..120).map(|i| format!("o{i}")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&refs), true);
        assert_eq!(store.displayed_count(), 50);

        assert_eq!(store.load_more().map(<[Offer]>::len), Some(50));
        assert_eq!(store.load_more().map(<[Offer]>::len), Some(20));
        assert!(store.load_more().is_none());
        assert!(store.load_more().is_none());
        assert_eq!(store.displayed_count(), store.filtered().len());
        assert_eq!(store.visible().len(), 120);
    }

    #[test]
    fn test_pinged_links_are_never_requested_again() {
        let mut store = OfferStore::default();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a", "b", "c"]), true);

        let first = store.ping_candidates(store.visible(), 50);
        assert_eq!(first, ["a", "b", "c"]);

        store.apply_ping_results(&PingResponse {
            success: true,
            results: vec![PingResult {
                link: "a".to_string(),
                is_valid: true,
                ping_time: Some("2025-05-01T12:00:00".to_string()),
            }],
            invalid_count: 0,
        });

        // "a" now carries a validity flag, but the cache alone must exclude it
        let mut overlapping = vec![offer("a"), offer("b"), offer("d")];
        overlapping[0].last_ping_is_valid = None;
        let second = store.ping_candidates(&overlapping, 50);
        assert_eq!(second, ["b", "d"]);
    }

    #[test]
    fn test_invalid_ping_removes_offer_from_list() {
        let mut store = OfferStore::default();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a", "b"]), true);

        let outcome = store.apply_ping_results(&PingResponse {
            success: true,
            results: vec![
                PingResult {
                    link: "a".to_string(),
                    is_valid: false,
                    ping_time: None,
                },
                PingResult {
                    link: "b".to_string(),
                    is_valid: true,
                    ping_time: None,
                },
            ],
            invalid_count: 1,
        });

        assert_eq!(outcome.removed, ["a"]);
        assert_eq!(store.current().len(), 1);
        assert_eq!(store.current()[0].last_ping_is_valid, Some(true));
        assert!(store.is_pinged("a"));
    }

    #[test]
    fn test_ping_candidates_are_capped() {
        let store = OfferStore::default();
        let offers: Vec<Offer> = (0..80).map(|i| offer(&format!("o{i}"))).collect();
        let batch = store.ping_candidates(&offers, 50);
        assert_eq!(batch.len(), 50);
        assert_eq!(batch[0], "o0");
    }

    #[test]
    fn test_prepend_new_skips_known_links() {
        let mut store = OfferStore::default();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a", "b"]), true);

        let fresh = store.prepend_new(vec![offer("c"), offer("a"), offer("c")]);
        assert_eq!(fresh.len(), 1);
        let keys: Vec<_> = store.current().iter().filter_map(Offer::key).collect();
        assert_eq!(keys, ["c", "a", "b"]);
    }

    #[test]
    fn test_viewport_list_survives_ping_and_prepend() {
        let mut store = OfferStore::default();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a", "b"]), true);
        store.set_sidebar_offers(&[offer("v1"), offer("v2")]);

        store.apply_ping_results(&PingResponse {
            success: true,
            results: vec![PingResult {
                link: "v1".to_string(),
                is_valid: false,
                ping_time: None,
            }],
            invalid_count: 1,
        });
        let keys: Vec<_> = store.visible().iter().filter_map(Offer::key).collect();
        assert_eq!(keys, ["v2"]);

        store.prepend_new(vec![offer("c")]);
        let keys: Vec<_> = store.visible().iter().filter_map(Offer::key).collect();
        assert_eq!(keys, ["v2"]);
        assert_eq!(store.current().len(), 3);
        assert!(store.load_more().is_none());

        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a"]), true);
        assert!(!store.shows_viewport());
        assert_eq!(store.visible().len(), 1);
    }

    #[test]
    fn test_map_source_falls_back_to_list() {
        let mut store = OfferStore::default();
        let (token, _) = store.begin_load(None);
        store.apply_page(token, page(&["a"]), true);
        assert_eq!(store.map_source().len(), 1);

        store.set_map_offers(vec![offer("a"), offer("m1"), offer("m2")]);
        assert_eq!(store.map_source().len(), 3);
        assert!(store.offer_by_link("m2").is_some());
    }
}
