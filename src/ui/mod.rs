//! The dashboard controller: ties the store, the map and the background
//! tasks to a [`Renderer`].

pub mod format;
pub mod render;
pub mod terminal;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::api::RentalApi;
use crate::config::Config;
use crate::error::FilterError;
use crate::events::{DashboardEvent, LoadOptions};
use crate::filter::{parse_max_price, FilterCriteria};
use crate::live::LiveUpdateClient;
use crate::map::{CoordKey, MapView, MarkerGroup, MarkerManager, Popup};
use crate::models::{Districts, LatLng, Offer, PingResponse};
use crate::notify::{NotificationQueue, NotificationSink};
use crate::ping::PingScheduler;
use crate::scrape::{ActivityState, Indicator, ScrapeMonitor, SharedActivity, StatusReport, StatusWatcher};
use crate::store::{OfferStore, PingOutcome, SharedStore};

pub use render::{cards, filter_tags, EmptyState, FilterTag, OfferCard, OfferModal, Renderer};
pub use terminal::TerminalRenderer;

use format::active_count_label;

/// Offers requested per "show more in this area".
pub const NEARBY_LIMIT: u32 = 100;
/// A refresh bigger than this gets announced.
const LARGE_REFRESH: usize = 10;
const FINISHED_INDICATOR_HOLD: Duration = Duration::from_secs(2);

pub const ALL_OFFERS_TITLE: &str = "Všechny nabídky";
pub const VIEWPORT_TITLE: &str = "Nabídky ve viditelné oblasti";

/// What the list panel is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListMode {
    /// The loaded (and filtered) list
    Loaded,
    /// Map offers inside the visible map area
    Viewport,
}

struct Inner {
    api: Arc<dyn RentalApi>,
    renderer: Arc<dyn Renderer>,
    config: Config,
    store: SharedStore,
    markers: Mutex<MarkerManager>,
    view: Mutex<MapView>,
    activity: SharedActivity,
    districts: Mutex<Districts>,
    scrapers: Mutex<Vec<String>>,
    mode: Mutex<ListMode>,
    notifications: NotificationQueue,
    pings: PingScheduler,
    events: mpsc::UnboundedSender<DashboardEvent>,
    indicator_hide: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the dashboard. Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

impl Dashboard {
    /// Build the dashboard and start its ping scheduler and notification
    /// dispatcher. Events from background tasks arrive on the returned
    /// receiver; hand it to [`Dashboard::run`].
    pub fn new(
        api: Arc<dyn RentalApi>,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn NotificationSink>,
        config: Config,
    ) -> (Self, mpsc::UnboundedReceiver<DashboardEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let store = OfferStore::new(config.list.page_size, config.list.page_limit).shared();
        let (notifications, dispatcher) = NotificationQueue::spawn(&config.notifications, sink);
        let (pings, scheduler) = PingScheduler::spawn(api.clone(), store.clone(), &config.ping, events.clone());

        let inner = Inner {
            markers: Mutex::new(MarkerManager::new(&config.map)),
            view: Mutex::new(MapView::new(&config.map)),
            activity: Arc::new(Mutex::new(ActivityState::default())),
            districts: Mutex::new(Districts::new()),
            scrapers: Mutex::new(Vec::new()),
            mode: Mutex::new(ListMode::Loaded),
            indicator_hide: Mutex::new(None),
            tasks: Mutex::new(vec![dispatcher, scheduler]),
            api,
            renderer,
            config,
            store,
            notifications,
            pings,
            events,
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    pub fn store(&self) -> SharedStore {
        self.inner.store.clone()
    }

    pub fn activity(&self) -> SharedActivity {
        self.inner.activity.clone()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.inner.notifications
    }

    pub fn map_view(&self) -> MapView {
        self.inner.view.lock().clone()
    }

    pub fn marker_groups(&self) -> Vec<MarkerGroup> {
        self.inner.markers.lock().groups().to_vec()
    }

    pub fn districts(&self) -> Districts {
        self.inner.districts.lock().clone()
    }

    pub fn scrapers(&self) -> Vec<String> {
        self.inner.scrapers.lock().clone()
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.inner.store.lock().criteria().clone()
    }

    /// First load: districts, scraper names, map offers, the list, then an
    /// automatic scrape unless the backend was started in quick mode.
    pub async fn init(&self) {
        info!("🏠 Starting rental dashboard");

        self.load_districts().await;
        self.load_scrapers().await;
        self.load_map_offers().await;
        self.load_offers(None, LoadOptions::quiet()).await;

        match self.inner.api.status().await {
            Ok(status) => {
                let report = StatusReport::from(&status);
                let auto_start = {
                    let mut activity = self.inner.activity.lock();
                    activity.quick_start = report.quick_start;
                    activity.observe(&report);
                    !report.quick_start && !report.activity.is_active()
                };
                self.update_processing_indicator(&report);
                if auto_start {
                    self.start_scraping().await;
                } else {
                    info!("Skipping automatic scrape ({})", report.text);
                }
            }
            Err(e) => warn!(error = %e, "Initial status check failed"),
        }
    }

    /// Start the status watcher and the live update listener.
    pub fn start_background(&self) {
        let inner = &self.inner;
        let watcher = StatusWatcher::new(
            inner.api.clone(),
            inner.activity.clone(),
            inner.pings.clone(),
            inner.notifications.clone(),
            &inner.config.scrape,
            inner.events.clone(),
        )
        .spawn();
        let live = LiveUpdateClient::new(
            inner.api.clone(),
            &inner.config.live,
            inner.notifications.clone(),
            inner.events.clone(),
        )
        .spawn();
        inner.tasks.lock().extend([watcher, live]);
    }

    /// Process background events until the channel closes.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<DashboardEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Abort every background task.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(hide) = self.inner.indicator_hide.lock().take() {
            hide.abort();
        }
    }

    pub async fn handle_event(&self, event: DashboardEvent) {
        match event {
            DashboardEvent::PingCompleted { response, outcome } => self.apply_ping(&response, &outcome),
            DashboardEvent::NewOffers(fresh) => {
                info!("🆕 Showing {} new offers", fresh.len());
                let mode = *self.inner.mode.lock();
                match mode {
                    ListMode::Loaded => self.render_list_and_map(false, true),
                    ListMode::Viewport => {
                        self.display_offers_on_map(false);
                        self.update_offers_for_current_view();
                    }
                }
            }
            DashboardEvent::ScrapeFinished => {
                self.update_processing_indicator_with(Indicator::Finished);
                self.reload_after_scrape().await;
            }
            DashboardEvent::ScrapeTimedOut => {
                self.inner
                    .notifications
                    .warning("Scrapování trvá příliš dlouho, sledování ukončeno");
                self.reload_after_scrape().await;
            }
            DashboardEvent::Reload(options) => {
                let district = self.selected_district();
                self.load_offers(district, options).await;
            }
            DashboardEvent::ScrapingActive(active) => {
                let mut activity = self.inner.activity.lock();
                if active {
                    activity.scraping_in_progress = true;
                } else {
                    activity.finish_scrape();
                }
            }
            DashboardEvent::Status(report) => self.update_processing_indicator(&report),
        }
    }

    fn selected_district(&self) -> Option<String> {
        self.inner.store.lock().selected_district().map(str::to_string)
    }

    /// Fetch the list for `district` and render it.
    pub async fn load_offers(&self, district: Option<String>, options: LoadOptions) {
        let inner = &self.inner;
        let (token, query) = inner.store.lock().begin_load(district);
        inner.renderer.set_loading(true);
        debug!(district = ?query.district, limit = query.limit, sort = ?query.sort, "Loading offers");

        let result = inner.api.offers(&query).await;
        if !inner.store.lock().is_current(token) {
            debug!("A newer load superseded this one");
            return;
        }
        inner.renderer.set_loading(false);

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, "Failed to load offers");
                let message = if e.is_timeout() {
                    "Timeout při načítání nabídek"
                } else {
                    "Chyba při načítání nabídek"
                };
                inner.renderer.render_error(message, true);
                return;
            }
        };

        let Some(outcome) = inner.store.lock().apply_page(token, page, options.reset_pagination) else {
            return;
        };
        info!("✅ Loaded {} offers", outcome.loaded);
        *inner.mode.lock() = ListMode::Loaded;

        if !outcome.expanded_districts.is_empty() {
            inner.notifications.info(format!(
                "Vyhledávání rozšířeno do okolních částí: {}",
                outcome.expanded_districts.join(", ")
            ));
        }

        self.render_offers(options.no_ping);

        let (scraping, quick_start) = {
            let activity = inner.activity.lock();
            (activity.scraping_in_progress, activity.quick_start)
        };
        if outcome.loaded > LARGE_REFRESH
            && outcome.previous_count > 0
            && !scraping
            && !inner.pings.is_in_flight()
        {
            inner.notifications.success(format!(
                "[{}] Načteno {} nových nabídek!",
                Local::now().format("%H:%M:%S"),
                outcome.loaded
            ));
        }

        if outcome.loaded == 0 && !options.no_scrape && !quick_start {
            info!("No offers yet, starting a scrape");
            self.start_scraping().await;
        }
    }

    async fn reload_after_scrape(&self) {
        self.load_map_offers().await;
        let district = self.selected_district();
        self.load_offers(district, LoadOptions::quiet()).await;

        if let Ok(status) = self.inner.api.status().await {
            self.inner.activity.lock().observe(&StatusReport::from(&status));
        }
    }

    /// Render the first page of the filtered list plus the map.
    pub fn render_offers(&self, no_ping: bool) {
        self.render_list_and_map(no_ping, false);
    }

    fn render_list_and_map(&self, no_ping: bool, refit: bool) {
        let inner = &self.inner;
        let (visible, total, district) = {
            let store = inner.store.lock();
            (
                store.visible().to_vec(),
                store.total_count(),
                store.selected_district().map(str::to_string),
            )
        };
        self.update_active_filters();

        if visible.is_empty() {
            inner.renderer.render_empty(&EmptyState::no_offers(district.as_deref()));
            inner.renderer.set_active_count("0");
            self.display_offers_on_map(refit);
            return;
        }

        inner.renderer.render_list(&cards(&visible));
        self.display_offers_on_map(refit);
        inner
            .renderer
            .set_active_count(&active_count_label(total, visible.len() as u64));
        if !no_ping {
            inner.pings.schedule(visible);
        }
    }

    /// Re-render the list panel only, leaving the map alone.
    pub fn render_sidebar_only(&self, skip_ping: bool) {
        let inner = &self.inner;
        let (visible, filtered, district) = {
            let store = inner.store.lock();
            (
                store.visible().to_vec(),
                store.filtered().len() as u64,
                store.selected_district().map(str::to_string),
            )
        };

        if visible.is_empty() {
            let state = match *inner.mode.lock() {
                ListMode::Viewport => EmptyState::empty_area(),
                ListMode::Loaded => EmptyState::no_offers(district.as_deref()),
            };
            inner.renderer.render_empty(&state);
            inner.renderer.set_active_count("0");
            return;
        }

        inner.renderer.render_list(&cards(&visible));
        inner
            .renderer
            .set_active_count(&active_count_label(filtered, visible.len() as u64));
        if !skip_ping {
            inner.pings.schedule(visible);
        }
    }

    /// The list was scrolled to `distance_px` from its bottom.
    pub fn on_scroll(&self, distance_px: u32) -> bool {
        distance_px <= self.inner.config.list.scroll_threshold_px && self.load_more()
    }

    /// Reveal the next page of cards. `false` once everything is shown.
    pub fn load_more(&self) -> bool {
        let inner = &self.inner;
        let (next, displayed, total) = {
            let mut store = inner.store.lock();
            let Some(next) = store.load_more().map(<[Offer]>::to_vec) else {
                return false;
            };
            (next, store.displayed_count() as u64, store.filtered().len() as u64)
        };
        debug!(added = next.len(), displayed, "Revealing more offers");

        inner.renderer.append_cards(&cards(&next));
        inner.renderer.set_active_count(&active_count_label(total, displayed));
        inner.pings.schedule(next);
        true
    }

    fn apply_ping(&self, response: &PingResponse, outcome: &PingOutcome) {
        let removed_markers = self.inner.markers.lock().apply_ping(response);
        if removed_markers > 0 {
            let markers = self.inner.markers.lock();
            self.inner.renderer.render_map(markers.groups(), &self.inner.view.lock());
        }
        if !outcome.removed.is_empty() {
            info!("Removing {} offers that are no longer available", outcome.removed.len());
            self.render_sidebar_only(true);
        }
    }

    /// Fetch the unbounded map set. On failure the map keeps using the list.
    pub async fn load_map_offers(&self) -> usize {
        match self.inner.api.offers_map().await {
            Ok(list) => {
                let count = list.offers.len();
                self.inner.store.lock().set_map_offers(list.offers);
                info!("🗺️ Loaded {} map offers", count);
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to load map offers, using the list instead");
                0
            }
        }
    }

    /// Rebuild markers from the filtered map offers and fit the view.
    pub fn display_offers_on_map(&self, refit: bool) {
        let offers = self.inner.store.lock().filtered_map_offers();
        let mut markers = self.inner.markers.lock();
        markers.rebuild(&offers);

        let mut view = self.inner.view.lock();
        let bounds = markers.bounds();
        if refit {
            view.refit(bounds);
        } else {
            view.auto_fit(bounds);
        }
        self.inner.renderer.render_map(markers.groups(), &view);
    }

    /// Replace the filter criteria and re-render whatever the list shows.
    pub fn apply_filters(&self, criteria: FilterCriteria) {
        debug!(?criteria, "Applying filters");
        self.inner.store.lock().set_criteria(criteria);

        let mode = *self.inner.mode.lock();
        match mode {
            ListMode::Loaded => self.render_offers(false),
            ListMode::Viewport => {
                self.display_offers_on_map(false);
                self.update_offers_for_current_view();
                self.update_active_filters();
            }
        }
    }

    /// Validate and apply a typed max-price value. Empty input clears it.
    pub fn set_max_price(&self, input: &str) -> Result<(), FilterError> {
        let max_price = parse_max_price(input)?;
        let mut criteria = self.criteria();
        criteria.max_price = max_price;
        self.apply_filters(criteria);
        Ok(())
    }

    pub async fn clear_filters(&self) {
        {
            let mut store = self.inner.store.lock();
            store.set_criteria(FilterCriteria::default());
            store.set_selected_district(None);
            store.clear_sidebar_offers();
        }
        *self.inner.mode.lock() = ListMode::Loaded;
        self.inner.renderer.set_panel_title(ALL_OFFERS_TITLE);
        self.load_offers(None, LoadOptions::quiet()).await;
    }

    /// Load one district and centre the map on it.
    pub async fn select_district(&self, district: &str) {
        if district.is_empty() {
            self.show_all().await;
            return;
        }

        let center = self.inner.districts.lock().get(district).copied();
        if let Some(center) = center {
            self.inner.view.lock().select_district(center);
        }
        self.inner.renderer.set_panel_title(&format!("Nabídky - {district}"));
        self.load_offers(Some(district.to_string()), LoadOptions::default()).await;
    }

    /// Back to every district, letting the map fit itself again.
    pub async fn show_all(&self) {
        self.inner.view.lock().reset_fit();
        self.inner.store.lock().set_selected_district(None);
        self.inner.renderer.set_panel_title(ALL_OFFERS_TITLE);
        self.load_offers(None, LoadOptions::default()).await;
    }

    /// The user panned or zoomed the map.
    pub fn on_map_moved(&self, center: LatLng, zoom: u8) {
        self.inner.view.lock().user_moved(center, zoom);
        self.update_offers_for_current_view();
    }

    /// Show the map offers inside the visible area in the list. Only after
    /// the user moved the map and once map offers exist.
    pub fn update_offers_for_current_view(&self) -> bool {
        let view = self.inner.view.lock().clone();
        if !view.user_interacted() {
            return false;
        }

        {
            let mut store = self.inner.store.lock();
            if store.map_source().is_empty() {
                return false;
            }
            let in_view: Vec<Offer> = store
                .map_source()
                .iter()
                .filter(|offer| offer.coords().is_some_and(|position| view.contains(position)))
                .cloned()
                .collect();
            store.set_sidebar_offers(&in_view);
        }

        *self.inner.mode.lock() = ListMode::Viewport;
        self.inner.renderer.set_panel_title(VIEWPORT_TITLE);
        self.render_sidebar_only(false);
        true
    }

    /// Pull more offers for the visible area from the backend.
    pub async fn show_more_offers_in_area(&self) -> usize {
        let bounds = self.inner.view.lock().bounds();
        let offers = match self.inner.api.offers_nearby(bounds, NEARBY_LIMIT).await {
            Ok(list) => list.offers,
            Err(e) => {
                warn!(error = %e, "Nearby offer request failed");
                self.inner.notifications.error("Chyba při načítání nabídek v okolí");
                return 0;
            }
        };

        if offers.is_empty() {
            self.inner.notifications.info("V okolí nejsou žádné další nabídky");
            return 0;
        }

        let count = offers.len();
        let added = self.inner.store.lock().merge_nearby(offers.clone());
        debug!(count, added, "Merged nearby offers");
        self.render_offers(false);

        {
            let mut markers = self.inner.markers.lock();
            markers.merge(&offers);
            let mut view = self.inner.view.lock();
            view.zoom_out();
            self.inner.renderer.render_map(markers.groups(), &view);
        }
        self.inner.notifications.success(format!("Načteno {count} nabídek v okolí"));
        count
    }

    /// Centre the map on the marker holding `link` and open its popup. An
    /// offer with coordinates but no marker gets one first.
    pub fn show_offer_on_map(&self, link: &str) -> bool {
        let offer = self.inner.store.lock().offer_by_link(link).cloned();
        let mut markers = self.inner.markers.lock();

        if markers.find_by_link(link).is_none() {
            if let Some(offer) = offer.filter(|offer| offer.coords().is_some()) {
                markers.merge(std::slice::from_ref(&offer));
            }
        }
        let Some(group) = markers.find_by_link(link) else {
            debug!(link, "Offer has no position on the map");
            return false;
        };
        let (position, popup) = (group.position, group.popup());

        let mut view = self.inner.view.lock();
        view.focus(position);
        self.inner.renderer.render_map(markers.groups(), &view);
        self.inner.renderer.show_popup(&popup);
        true
    }

    /// Popup content for a marker, built now from its current offers.
    pub fn open_popup(&self, key: &CoordKey) -> Option<Popup> {
        let popup = self.inner.markers.lock().get(key)?.popup();
        self.inner.view.lock().set_popup_open(true);
        self.inner.renderer.show_popup(&popup);
        Some(popup)
    }

    pub fn close_popup(&self) {
        self.inner.view.lock().set_popup_open(false);
    }

    pub fn show_offer_modal(&self, link: &str) -> Option<OfferModal> {
        let modal = OfferModal::new(self.inner.store.lock().offer_by_link(link)?);
        self.inner.renderer.show_modal(&modal);
        Some(modal)
    }

    /// Fetch description and images from the listing itself.
    pub async fn load_offer_extra_detail(&self, link: &str) -> Option<OfferModal> {
        let offer = self.inner.store.lock().offer_by_link(link).cloned()?;

        let detail = match self.inner.api.offer_detail(link, &offer.scraper).await {
            Ok(response) if response.success => response.detail,
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, link, "Offer detail request failed");
                None
            }
        };
        let Some(detail) = detail else {
            self.inner.notifications.error("Nepodařilo se načíst detaily");
            return None;
        };

        // Stored as fetched; the modal flattens it.
        if let Some(description) = detail.description.as_deref() {
            self.inner.store.lock().set_description(link, description);
        }
        let modal = OfferModal::new(&offer).with_detail(&detail);
        self.inner.renderer.show_modal(&modal);
        Some(modal)
    }

    /// Ask the backend to scrape and watch it until done. Returns whether a
    /// new scrape was started.
    pub async fn start_scraping(&self) -> bool {
        let inner = &self.inner;
        if !inner.activity.lock().try_begin_start() {
            debug!("Scrape already in progress");
            return false;
        }

        match inner.api.status().await {
            Ok(status) => inner.activity.lock().monitor_baseline = status.offer_count(),
            Err(e) => debug!(error = %e, "No status before scraping, counting from zero"),
        }

        match inner.api.start_scraping().await {
            Ok(response) if response.success => {
                info!("🚀 Scraping started");
                inner.notifications.success("Scrapování nových nabídek spuštěno!");
                self.spawn_monitor();
                true
            }
            Ok(response) if response.already_running() => {
                info!("Backend is already scraping");
                inner.activity.lock().scrape_started = false;
                self.spawn_monitor();
                false
            }
            Ok(response) => {
                let message = response.message.unwrap_or_default();
                warn!("Backend refused to scrape: {}", message);
                inner
                    .notifications
                    .error(format!("Chyba při spuštění scrapování: {message}"));
                inner.activity.lock().finish_scrape();
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to start scraping");
                inner.notifications.error("Chyba při spuštění scrapování");
                inner.activity.lock().finish_scrape();
                false
            }
        }
    }

    fn spawn_monitor(&self) {
        let inner = &self.inner;
        let monitor = ScrapeMonitor::new(
            inner.api.clone(),
            inner.store.clone(),
            inner.activity.clone(),
            &inner.config.scrape,
            inner.events.clone(),
        )
        .spawn();
        let mut tasks = inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(monitor);
    }

    /// The retry button of the error state.
    pub async fn retry(&self) {
        let district = self.selected_district();
        self.load_offers(district, LoadOptions::default()).await;
    }

    pub fn update_active_filters(&self) {
        let tags = filter_tags(self.inner.store.lock().criteria());
        self.inner.renderer.set_active_filters(&tags);
    }

    pub fn update_processing_indicator(&self, report: &StatusReport) {
        self.update_processing_indicator_with(report.indicator());
    }

    fn update_processing_indicator_with(&self, indicator: Indicator) {
        let mut hide = self.inner.indicator_hide.lock();
        if let Some(pending) = hide.take() {
            pending.abort();
        }
        self.inner.renderer.set_processing_indicator(indicator.text());

        if indicator == Indicator::Finished {
            let renderer = self.inner.renderer.clone();
            *hide = Some(tokio::spawn(async move {
                sleep(FINISHED_INDICATOR_HOLD).await;
                renderer.set_processing_indicator(None);
            }));
        }
    }

    /// Scraper names for the source filter, from `/api/stats`.
    pub async fn load_scrapers(&self) -> Vec<String> {
        match self.inner.api.stats().await {
            Ok(stats) => {
                let names: Vec<String> = stats.by_scraper.into_keys().collect();
                self.inner.renderer.set_scraper_options(&names);
                *self.inner.scrapers.lock() = names.clone();
                names
            }
            Err(e) => {
                warn!(error = %e, "Failed to load scraper names");
                Vec::new()
            }
        }
    }

    pub async fn load_districts(&self) -> usize {
        match self.inner.api.districts().await {
            Ok(districts) => {
                let count = districts.len();
                *self.inner.districts.lock() = districts;
                debug!(count, "Loaded districts");
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to load districts");
                0
            }
        }
    }
}
