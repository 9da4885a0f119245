//! Server-push listener for `/api/stream`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::RentalApi;
use crate::config::LiveConfig;
use crate::error::ApiError;
use crate::events::{DashboardEvent, LoadOptions};
use crate::models::StreamMessage;
use crate::notify::{Category, NotificationQueue};

/// Typed form of a stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Connected,
    PingProgress { progress: f64 },
    ScrapingStart,
    ScrapingProgress,
    ScraperComplete { count: u64 },
    ScrapingComplete { total: u64 },
    OffersUpdated { changed: bool },
    NewOffer { changed: bool },
    Unknown(String),
}

fn number(data: &Value, field: &str) -> f64 {
    data.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn count(data: &Value, field: &str) -> u64 {
    data.get(field).and_then(Value::as_u64).unwrap_or(0)
}

/// `count` or `offer` carries something worth reloading for.
fn carries_offers(data: &Value) -> bool {
    let truthy = |value: Option<&Value>| match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };
    truthy(data.get("count")) || truthy(data.get("offer"))
}

impl From<&StreamMessage> for LiveEvent {
    fn from(message: &StreamMessage) -> Self {
        let data = &message.data;
        match message.kind.as_str() {
            "connected" => Self::Connected,
            "ping_progress" => Self::PingProgress {
                progress: number(data, "progress"),
            },
            "scraping_start" => Self::ScrapingStart,
            "scraping_progress" => Self::ScrapingProgress,
            "scraper_complete" => Self::ScraperComplete {
                count: count(data, "count"),
            },
            "scraping_complete" => Self::ScrapingComplete {
                total: count(data, "total"),
            },
            "offers_updated" => Self::OffersUpdated {
                changed: carries_offers(data),
            },
            "new_offer" => Self::NewOffer {
                changed: carries_offers(data),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// What the dashboard should do about an event.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveAction {
    Notify(String, Category),
    SetScraping(bool),
    Reload,
}

impl LiveEvent {
    pub fn actions(&self) -> Vec<LiveAction> {
        match self {
            Self::PingProgress { progress } if *progress >= 100.0 => {
                vec![LiveAction::Notify("Pingování dokončeno".to_string(), Category::Success)]
            }
            Self::ScrapingStart => vec![LiveAction::SetScraping(true)],
            Self::ScraperComplete { count } if *count > 0 => vec![LiveAction::Reload],
            Self::ScrapingComplete { total } => vec![
                LiveAction::SetScraping(false),
                LiveAction::Reload,
                LiveAction::Notify(format!("Scrapování dokončeno: {total} nabídek"), Category::Success),
            ],
            Self::OffersUpdated { changed: true } | Self::NewOffer { changed: true } => {
                vec![LiveAction::Reload]
            }
            _ => Vec::new(),
        }
    }
}

/// Delay between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl From<&LiveConfig> for ReconnectPolicy {
    fn from(config: &LiveConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.reconnect_delay_secs),
            max: Duration::from_secs(config.max_reconnect_delay_secs.max(config.reconnect_delay_secs)),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use after `current`. Never more than `max`.
    pub fn next(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Keeps one stream connection open and turns frames into dashboard events.
pub struct LiveUpdateClient {
    api: Arc<dyn RentalApi>,
    policy: ReconnectPolicy,
    notifications: NotificationQueue,
    events: mpsc::UnboundedSender<DashboardEvent>,
}

impl LiveUpdateClient {
    pub fn new(
        api: Arc<dyn RentalApi>,
        config: &LiveConfig,
        notifications: NotificationQueue,
        events: mpsc::UnboundedSender<DashboardEvent>,
    ) -> Self {
        Self {
            api,
            policy: ReconnectPolicy::from(config),
            notifications,
            events,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Reconnects forever; stops once the dashboard is gone.
    pub async fn run(self) {
        let mut delay = self.policy.initial;

        loop {
            match self.api.stream().await {
                Ok(mut stream) => {
                    info!("📡 Live updates connected");
                    delay = self.policy.initial;

                    while let Some(frame) = stream.next().await {
                        match frame {
                            Ok(message) => self.handle(&message),
                            Err(ApiError::Decode { reason, .. }) => {
                                debug!("Ignoring malformed stream frame: {}", reason);
                            }
                            Err(e) => {
                                warn!(error = %e, "Live update stream failed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Could not open live update stream"),
            }

            if self.events.is_closed() {
                return;
            }
            debug!("Reconnecting live updates in {:?}", delay);
            sleep(delay).await;
            delay = self.policy.next(delay);
        }
    }

    fn handle(&self, message: &StreamMessage) {
        let event = LiveEvent::from(message);
        if event == LiveEvent::Connected {
            return;
        }
        info!("[Status] {}: {}", message.kind, message.message);

        for action in event.actions() {
            match action {
                LiveAction::Notify(text, category) => self.notifications.push(text, category),
                LiveAction::SetScraping(active) => {
                    let _ = self.events.send(DashboardEvent::ScrapingActive(active));
                }
                LiveAction::Reload => {
                    // An empty list after a finished scrape must not start another one
                    let options = LoadOptions {
                        no_scrape: true,
                        ..LoadOptions::default()
                    };
                    let _ = self.events.send(DashboardEvent::Reload(options));
                }
            }
        }
    }
}
