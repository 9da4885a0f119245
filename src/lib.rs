//! Client for the Prague rental-listing dashboard backend: offer list and
//! map state, filtering, background pinging, scrape monitoring and live
//! updates, rendered through a pluggable [`ui::Renderer`].

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod live;
pub mod map;
pub mod models;
pub mod notify;
pub mod ping;
pub mod scrape;
pub mod store;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpApi, OfferQuery, RentalApi};
pub use config::Config;
pub use error::{ApiError, ConfigError, FilterError};
pub use events::{DashboardEvent, LoadOptions};
pub use filter::{Disposition, FilterCriteria, SortOrder};
pub use models::{Offer, Price};
pub use ui::{Dashboard, Renderer, TerminalRenderer};
