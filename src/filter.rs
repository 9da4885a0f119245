//! Pure offer filtering and sorting. Nothing here mutates its input.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::FilterError;
use crate::models::Offer;
use crate::ui::format::parse_timestamp;

/// Prices at or above this are sale listings, not rentals.
pub const SALE_PRICE_THRESHOLD: u64 = 1_000_000;

/// Room layout selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    OneKk,
    OnePlusOne,
    TwoKk,
    TwoPlusOne,
    ThreeKk,
    ThreePlusOne,
    FourKk,
    FourPlusOne,
    /// "5++": five rooms or more
    FivePlus,
    /// Studios and atypical layouts
    Others,
}

impl Disposition {
    pub const ALL: [Self; 10] = [
        Self::OneKk,
        Self::OnePlusOne,
        Self::TwoKk,
        Self::TwoPlusOne,
        Self::ThreeKk,
        Self::ThreePlusOne,
        Self::FourKk,
        Self::FourPlusOne,
        Self::FivePlus,
        Self::Others,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::OneKk => "1+kk",
            Self::OnePlusOne => "1+1",
            Self::TwoKk => "2+kk",
            Self::TwoPlusOne => "2+1",
            Self::ThreeKk => "3+kk",
            Self::ThreePlusOne => "3+1",
            Self::FourKk => "4+kk",
            Self::FourPlusOne => "4+1",
            Self::FivePlus => "5++",
            Self::Others => "others",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FivePlus => "5+ a větší",
            Self::Others => "Ostatní",
            other => other.code(),
        }
    }

    /// Substrings of the lowercased title + location that select this layout.
    pub fn tokens(self) -> &'static [&'static str] {
        match self {
            Self::OneKk => &["1+kk", "1 kk", "1kk"],
            Self::OnePlusOne => &["1+1", "1 +1"],
            Self::TwoKk => &["2+kk", "2 kk", "2kk"],
            Self::TwoPlusOne => &["2+1", "2 +1"],
            Self::ThreeKk => &["3+kk", "3 kk", "3kk"],
            Self::ThreePlusOne => &["3+1", "3 +1"],
            Self::FourKk => &["4+kk", "4 kk", "4kk"],
            Self::FourPlusOne => &["4+1", "4 +1"],
            Self::FivePlus => &["5+kk", "5+1", "6+", "7+"],
            Self::Others => &["garsonka", "atypický", "atypicky"],
        }
    }

    pub fn matches(self, offer: &Offer) -> bool {
        let text = format!("{} {}", offer.title, offer.location).to_lowercase();
        self.tokens().iter().any(|token| text.contains(token))
    }
}

impl FromStr for Disposition {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.code() == s.trim())
            .ok_or_else(|| FilterError::UnknownDisposition(s.to_string()))
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Keep the backend's order
    #[default]
    Default,
    PriceAsc,
    PriceDesc,
    Newest,
    Oldest,
}

impl SortOrder {
    /// Value of the `sort` query parameter.
    pub fn as_query(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::PriceAsc => Some("price-asc"),
            Self::PriceDesc => Some("price-desc"),
            Self::Newest => Some("newest"),
            Self::Oldest => Some("oldest"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "Výchozí řazení",
            Self::PriceAsc => "Cena vzestupně",
            Self::PriceDesc => "Cena sestupně",
            Self::Newest => "Nejnovější",
            Self::Oldest => "Nejstarší",
        }
    }
}

impl FromStr for SortOrder {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "default" => Ok(Self::Default),
            "price-asc" => Ok(Self::PriceAsc),
            "price-desc" => Ok(Self::PriceDesc),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            other => Err(FilterError::UnknownSort(other.to_string())),
        }
    }
}

/// Parse a max-price input. Empty input means no limit.
pub fn parse_max_price(input: &str) -> Result<Option<u64>, FilterError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u64>() {
        Ok(value) if value <= SALE_PRICE_THRESHOLD => Ok(Some(value)),
        _ => Err(FilterError::InvalidPrice(input.to_string())),
    }
}

/// UI filter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub disposition: Option<Disposition>,
    pub scraper: Option<String>,
    /// District selector, e.g. "Praha 10"
    pub district: Option<String>,
    pub max_price: Option<u64>,
    pub sort: SortOrder,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Matches an offer against a "Praha N" selector without letting "Praha 1"
/// match "Praha 10".
#[derive(Debug)]
pub struct DistrictMatcher {
    pattern: Option<Regex>,
    needle: String,
}

impl DistrictMatcher {
    pub fn new(selector: &str) -> Self {
        let needle = selector.trim().to_lowercase();
        let pattern = needle
            .split_whitespace()
            .nth(1)
            .filter(|number| number.chars().all(|c| c.is_ascii_digit()))
            .and_then(|number| {
                let n = regex::escape(number);
                Regex::new(&format!(r"(?i)praha\s+{n}\b|praha\s*{n}(?:\D|$)|\bp\s*{n}\b")).ok()
            });
        Self { pattern, needle }
    }

    pub fn matches(&self, offer: &Offer) -> bool {
        let city_part = offer.city_part.as_deref().unwrap_or_default().to_lowercase();
        let Some(pattern) = &self.pattern else {
            let text = format!("{} {} {}", offer.location, offer.title, city_part).to_lowercase();
            return text.contains(&self.needle);
        };

        if !city_part.is_empty() && (city_part == self.needle || pattern.is_match(&city_part)) {
            return true;
        }

        let text = format!("{} {} {}", offer.location, offer.title, city_part).to_lowercase();
        pattern.is_match(&text)
    }
}

/// Apply the disposition, scraper, district and max-price filters.
pub fn filter_offers(offers: &[Offer], criteria: &FilterCriteria) -> Vec<Offer> {
    let district = criteria.district.as_deref().map(DistrictMatcher::new);

    offers
        .iter()
        .filter(|offer| criteria.disposition.map_or(true, |d| d.matches(offer)))
        .filter(|offer| {
            criteria
                .scraper
                .as_deref()
                .map_or(true, |scraper| offer.scraper == scraper)
        })
        .filter(|offer| district.as_ref().map_or(true, |m| m.matches(offer)))
        .filter(|offer| {
            criteria
                .max_price
                .map_or(true, |max| offer.price.amount() <= max)
        })
        .cloned()
        .collect()
}

/// Drop offers confirmed dead and anything that isn't priced like a rental.
/// Never-pinged offers stay.
pub fn filter_pinged(offers: &[Offer]) -> Vec<Offer> {
    offers
        .iter()
        .filter(|offer| !offer.is_marked_dead())
        .filter(|offer| {
            let price = offer.price.amount();
            price > 0 && price < SALE_PRICE_THRESHOLD
        })
        .cloned()
        .collect()
}

fn update_time(offer: &Offer) -> Option<DateTime<Utc>> {
    offer.last_update().and_then(parse_timestamp)
}

/// Stable sort; offers without a parsable update time count as oldest.
pub fn sort_offers(offers: &[Offer], order: SortOrder) -> Vec<Offer> {
    let mut sorted = offers.to_vec();
    match order {
        SortOrder::Default => {}
        SortOrder::PriceAsc => sorted.sort_by_key(|offer| offer.price.amount()),
        SortOrder::PriceDesc => {
            sorted.sort_by(|a, b| b.price.amount().cmp(&a.price.amount()));
        }
        SortOrder::Newest => sorted.sort_by(|a, b| compare_times(update_time(b), update_time(a))),
        SortOrder::Oldest => sorted.sort_by(|a, b| compare_times(update_time(a), update_time(b))),
    }
    sorted
}

fn compare_times(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    // None < Some, so missing times sort as the oldest
    a.cmp(&b)
}

/// Full pipeline for list and map views.
pub fn apply(offers: &[Offer], criteria: &FilterCriteria) -> Vec<Offer> {
    let visible = filter_offers(&filter_pinged(offers), criteria);
    sort_offers(&visible, criteria.sort)
}
