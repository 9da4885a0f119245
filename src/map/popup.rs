//! Popup content for a marker group, built on demand from the group's
//! current offers.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Offer;
use crate::ui::format::{format_area, monthly_price};

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

fn praha_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"(?i)praha\s*\d{1,2}")
}

fn quarter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(
        &RE,
        r"(?i)praha\s*\d|žižkov|vinohrady|smíchov|karlín|holešovice|dejvice|vršovice|nusle|libeň|vysočany",
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupItem {
    pub link: String,
    pub title: String,
    /// "12 000 Kč/měsíc"
    pub price: String,
    pub source: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub header: String,
    /// "N nabídek"
    pub count_label: String,
    pub items: Vec<PopupItem>,
}

impl Popup {
    pub fn build(offers: &[Offer], location: &str) -> Self {
        let items = offers
            .iter()
            .map(|offer| PopupItem {
                link: offer.key().unwrap_or_default().to_string(),
                title: format_area(&offer.title),
                price: monthly_price(&offer.price),
                source: offer.scraper.clone(),
                image_url: offer.image_url.clone(),
            })
            .collect();

        Self {
            header: format_area(&header_label(offers, location)),
            count_label: format!("{} nabídek", offers.len()),
            items,
        }
    }
}

/// "Praha5" / "praha  5" become "Praha5" / "Praha 5".
fn normalise_praha(found: &str) -> String {
    let collapsed = found.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("praha") => format!("Praha{}", &collapsed[5..]),
        _ => collapsed,
    }
}

/// Street plus "Praha N" for the popup header.
pub fn header_label(offers: &[Offer], fallback_location: &str) -> String {
    let street = offers
        .iter()
        .filter_map(|offer| offer.street_name.as_deref())
        .map(str::trim)
        .find(|street| !street.is_empty())
        .or_else(|| {
            fallback_location
                .split(',')
                .next()
                .map(str::trim)
                .filter(|street| !street.is_empty())
        });

    let praha = offers
        .iter()
        .filter_map(|offer| offer.district.as_deref())
        .chain(offers.iter().filter_map(|offer| offer.city_part.as_deref()))
        .chain(std::iter::once(fallback_location))
        .find_map(|text| praha_regex().find(text))
        .map(|found| normalise_praha(found.as_str()));

    match (street, praha) {
        (Some(street), Some(praha)) => format!("{street}, {praha}"),
        (Some(street), None) => street.to_string(),
        (None, Some(praha)) => praha,
        (None, None) => {
            let location = if fallback_location.is_empty() {
                "Praha"
            } else {
                fallback_location
            };
            shorten_location_label(location)
        }
    }
}

/// Keep the street and the first district-like part of a long address.
pub fn shorten_location_label(text: &str) -> String {
    let parts: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() <= 2 {
        return parts.join(", ");
    }

    let district = parts
        .iter()
        .find(|part| quarter_regex().is_match(part))
        .unwrap_or(&parts[1]);
    format!("{}, {}", parts[0], district)
}
