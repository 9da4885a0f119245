//! Messages background tasks send to the dashboard.

use crate::models::{Offer, PingResponse};
use crate::scrape::StatusReport;
use crate::store::PingOutcome;

/// Options for one list load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Don't start a scrape when the list comes back empty
    pub no_scrape: bool,
    /// Don't ping the first page of cards
    pub no_ping: bool,
    /// Replace the held list instead of appending to it
    pub reset_pagination: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            no_scrape: false,
            no_ping: false,
            reset_pagination: true,
        }
    }
}

impl LoadOptions {
    /// Reload after background activity: never triggers more activity.
    pub fn quiet() -> Self {
        Self {
            no_scrape: true,
            no_ping: true,
            reset_pagination: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    /// A ping batch came back and was merged into the store.
    PingCompleted {
        response: PingResponse,
        outcome: PingOutcome,
    },
    /// The scrape monitor found offers not held yet; already prepended.
    NewOffers(Vec<Offer>),
    /// The backend reports the scrape is over.
    ScrapeFinished,
    /// The scrape monitor gave up waiting.
    ScrapeTimedOut,
    /// Reload the selected district.
    Reload(LoadOptions),
    /// The live channel saw a scrape start or end.
    ScrapingActive(bool),
    /// Fresh backend status for the processing indicator.
    Status(StatusReport),
}
