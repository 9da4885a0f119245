//! Backend activity: status classification, the scrape monitor and the
//! slower status watcher.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{OfferQuery, RentalApi};
use crate::config::ScrapeConfig;
use crate::events::{DashboardEvent, LoadOptions};
use crate::notify::NotificationQueue;
use crate::ping::PingScheduler;
use crate::store::SharedStore;
use crate::ui::format::truncate;

/// Longest indicator text before it gets shortened.
const INDICATOR_MAX_CHARS: usize = 40;

/// Scraper names as they appear in status text, with their display names.
const SCRAPER_NAMES: [(&str, &str); 10] = [
    ("BAZOS", "Bazos"),
    ("Sreality", "Sreality"),
    ("BezRealitky", "Bezrealitky"),
    ("iDNES Reality", "iDNES Reality"),
    ("realingo", "Realingo"),
    ("Remax", "Remax"),
    ("REALCITY", "Realcity"),
    ("Eurobydlení", "Euro Bydlení"),
    ("UlovDomov", "UlovDomov"),
    ("BRAVIS", "Bravis"),
];

/// What the backend is doing, read from its free-form status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Pinging,
    Starting,
    Scraping,
    Processing,
    Finished,
}

impl Activity {
    pub fn classify(status: &str) -> Self {
        let status = status.trim();
        if status.is_empty() {
            Self::Idle
        } else if status.contains("Pinguji") {
            Self::Pinging
        } else if status.contains("Dokončeno")
            || status.contains("dokončeno")
            || status.contains("FETCHOVÁNÍ DOKONČENO")
        {
            Self::Finished
        } else if status.contains("Zpracovávám") || status.contains("Auto-zpracováno") {
            Self::Processing
        } else if status.contains("Začínám") || status.contains("Spouštím scrapování") {
            Self::Starting
        } else if status.contains("Scrapuji") || status.contains("Scrapování") {
            Self::Scraping
        } else {
            Self::Idle
        }
    }

    /// A scrape job is running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Scraping | Self::Processing)
    }

    /// The status watcher should look again soon.
    pub fn fast_poll(self) -> bool {
        matches!(self, Self::Starting | Self::Processing)
    }
}

/// Processing indicator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indicator {
    Hidden,
    Busy(String),
    /// Shown briefly, then hidden
    Finished,
}

impl Indicator {
    pub const FINISHED_TEXT: &'static str = "Scrapování dokončeno";

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Hidden => None,
            Self::Busy(text) => Some(text),
            Self::Finished => Some(Self::FINISHED_TEXT),
        }
    }
}

/// One classified `/api/status` answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    pub activity: Activity,
    pub text: String,
    pub offer_count: u64,
    pub last_update: Option<String>,
    pub quick_start: bool,
}

impl From<&crate::models::StatusResponse> for StatusReport {
    fn from(status: &crate::models::StatusResponse) -> Self {
        let text = status.fetching_status.clone().unwrap_or_default();
        Self {
            activity: Activity::classify(&text),
            text,
            offer_count: status.offer_count(),
            last_update: status.last_update.clone(),
            quick_start: status.is_quick_start(),
        }
    }
}

impl StatusReport {
    pub fn indicator(&self) -> Indicator {
        match self.activity {
            Activity::Finished => Indicator::Finished,
            activity if activity.is_active() => {
                let working = self.text.contains("Scrapuji") || self.text.contains("Zpracovávám");
                let named = SCRAPER_NAMES
                    .iter()
                    .find(|(key, name)| self.text.contains(key) || self.text.contains(name))
                    .filter(|_| working)
                    .map(|(_, name)| format!("Scrapuji {name}..."));
                let text = named.unwrap_or_else(|| self.text.clone());
                Indicator::Busy(truncate(&text, INDICATOR_MAX_CHARS))
            }
            _ => Indicator::Hidden,
        }
    }
}

/// Flags shared by everything that starts, watches or reacts to scrapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityState {
    pub scraping_in_progress: bool,
    /// A start request was issued and hasn't been resolved
    pub scrape_started: bool,
    /// Offer count the scrape monitor compares against
    pub monitor_baseline: u64,
    /// What the status watcher last saw
    pub known_offer_count: u64,
    pub known_update_time: Option<String>,
    pub quick_start: bool,
}

impl ActivityState {
    /// Claim the right to start a scrape. `false` when one is already going.
    pub fn try_begin_start(&mut self) -> bool {
        if self.scraping_in_progress || self.scrape_started {
            return false;
        }
        self.scrape_started = true;
        self.scraping_in_progress = true;
        true
    }

    pub fn finish_scrape(&mut self) {
        self.scraping_in_progress = false;
        self.scrape_started = false;
    }

    /// Remember a status as the watcher's baseline. Returns whether it
    /// differs from the previous one.
    pub fn observe(&mut self, report: &StatusReport) -> bool {
        let changed = report.offer_count != self.known_offer_count
            || report.last_update != self.known_update_time;
        self.known_offer_count = report.offer_count;
        self.known_update_time = report.last_update.clone();
        changed
    }
}

pub type SharedActivity = Arc<Mutex<ActivityState>>;

/// Polls the backend while a scrape runs, pulling in new offers as they
/// appear and announcing the end.
pub struct ScrapeMonitor {
    api: Arc<dyn RentalApi>,
    store: SharedStore,
    activity: SharedActivity,
    events: mpsc::UnboundedSender<DashboardEvent>,
    poll_interval: Duration,
    max_duration: Duration,
    settle: Duration,
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Continue,
    Finished,
}

impl ScrapeMonitor {
    pub fn new(
        api: Arc<dyn RentalApi>,
        store: SharedStore,
        activity: SharedActivity,
        config: &ScrapeConfig,
        events: mpsc::UnboundedSender<DashboardEvent>,
    ) -> Self {
        Self {
            api,
            store,
            activity,
            events,
            poll_interval: config.poll_interval(),
            max_duration: config.max_duration(),
            settle: config.settle(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let deadline = Instant::now() + self.max_duration;
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("👀 Monitoring scrape progress");

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    let was_running = {
                        let mut activity = self.activity.lock();
                        let running = activity.scraping_in_progress;
                        if running {
                            activity.finish_scrape();
                        }
                        running
                    };
                    warn!("Scrape monitor gave up after {:?}", self.max_duration);
                    if was_running {
                        let _ = self.events.send(DashboardEvent::ScrapeTimedOut);
                    }
                    return;
                }
                _ = ticker.tick() => {
                    if self.tick().await == Tick::Finished {
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Tick {
        let status = match self.api.status().await {
            Ok(status) => status,
            Err(e) => {
                debug!(error = %e, "Status poll failed during scrape");
                return Tick::Continue;
            }
        };
        let report = StatusReport::from(&status);
        let _ = self.events.send(DashboardEvent::Status(report.clone()));

        let new_count = {
            let mut activity = self.activity.lock();
            if report.offer_count > activity.monitor_baseline {
                let grown = report.offer_count - activity.monitor_baseline;
                activity.monitor_baseline = report.offer_count;
                Some(grown)
            } else {
                None
            }
        };

        if let Some(grown) = new_count {
            self.pull_newest(grown).await;
        }

        let finished = report.activity == Activity::Finished
            || (!report.activity.is_active() && self.activity.lock().scraping_in_progress);
        if !finished {
            return Tick::Continue;
        }

        self.activity.lock().finish_scrape();
        info!("✅ Scrape finished: {}", report.text);
        sleep(self.settle).await;
        let _ = self.events.send(DashboardEvent::ScrapeFinished);
        Tick::Finished
    }

    async fn pull_newest(&self, grown: u64) {
        let limit = u32::try_from(grown.saturating_add(50).max(100)).unwrap_or(u32::MAX);
        let page = match self.api.offers(&OfferQuery::newest(limit)).await {
            Ok(page) => page,
            Err(e) => {
                debug!(error = %e, "Failed to fetch newest offers");
                return;
            }
        };

        let fresh = self.store.lock().prepend_new(page.offers);
        if !fresh.is_empty() {
            info!("🆕 {} new offers while scraping", fresh.len());
            let _ = self.events.send(DashboardEvent::NewOffers(fresh));
        }
    }
}

/// Slow status poll that reloads the list when the backend's offer count
/// or update time moves.
pub struct StatusWatcher {
    api: Arc<dyn RentalApi>,
    activity: SharedActivity,
    pings: PingScheduler,
    notifications: NotificationQueue,
    events: mpsc::UnboundedSender<DashboardEvent>,
    config: ScrapeConfig,
}

impl StatusWatcher {
    pub fn new(
        api: Arc<dyn RentalApi>,
        activity: SharedActivity,
        pings: PingScheduler,
        notifications: NotificationQueue,
        config: &ScrapeConfig,
        events: mpsc::UnboundedSender<DashboardEvent>,
    ) -> Self {
        Self {
            api,
            activity,
            pings,
            notifications,
            events,
            config: config.clone(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        sleep(Duration::from_secs(self.config.status_initial_delay_secs)).await;
        loop {
            let delay = self.check().await;
            if self.events.is_closed() {
                return;
            }
            sleep(delay).await;
        }
    }

    async fn check(&self) -> Duration {
        let status = match self.api.status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Status check failed");
                if e.is_unreachable() {
                    self.notifications
                        .error("⚠️ Server není dostupný - zkontrolujte, jestli backend běží");
                }
                return Duration::from_secs(self.config.status_error_interval_secs);
            }
        };

        let report = StatusReport::from(&status);
        let reload = {
            let mut activity = self.activity.lock();
            let changed = activity.observe(&report);
            changed && !activity.scraping_in_progress
        };
        if reload && !self.pings.is_in_flight() {
            debug!(count = report.offer_count, "Backend offers changed, reloading");
            let _ = self.events.send(DashboardEvent::Reload(LoadOptions::quiet()));
        }

        let fast = report.activity.fast_poll();
        let _ = self.events.send(DashboardEvent::Status(report));
        if fast {
            Duration::from_secs(self.config.status_busy_interval_secs)
        } else {
            Duration::from_secs(self.config.status_interval_secs)
        }
    }
}
