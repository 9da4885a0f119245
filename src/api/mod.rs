pub mod client;
pub mod sse;
pub mod traits;
pub mod types;

pub use client::HttpApi;
pub use traits::{EventStream, RentalApi};
pub use types::OfferQuery;
