//! What the dashboard shows, independent of where it is shown.

use scraper::Html;

use crate::filter::FilterCriteria;
use crate::map::{MapView, MarkerGroup, Popup};
use crate::models::{Offer, OfferDetail};
use crate::ui::format::{format_area, format_datetime, group_digits, monthly_price};

pub const NO_DESCRIPTION: &str = "Popisek není k dispozici";

/// One card of the offer list.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferCard {
    pub link: String,
    pub title: String,
    pub location: String,
    /// "12 000 Kč/měsíc"
    pub price: String,
    pub scraper: String,
    /// "DD.MM.YYYY HH:MM" or "Neznámo"
    pub updated: String,
    pub image_url: Option<String>,
}

impl From<&Offer> for OfferCard {
    fn from(offer: &Offer) -> Self {
        Self {
            link: offer.key().unwrap_or_default().to_string(),
            title: format_area(&offer.title),
            location: format_area(&offer.location),
            price: monthly_price(&offer.price),
            scraper: offer.scraper.clone(),
            updated: format_datetime(offer.last_update()),
            image_url: offer.image_url.clone(),
        }
    }
}

pub fn cards(offers: &[Offer]) -> Vec<OfferCard> {
    offers.iter().map(OfferCard::from).collect()
}

/// Placeholder shown instead of cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyState {
    pub title: String,
    pub hint: String,
    pub retry: bool,
}

impl EmptyState {
    pub fn no_offers(district: Option<&str>) -> Self {
        match district {
            Some(district) => Self {
                title: format!("Žádné nabídky v {district}"),
                hint: "Zkuste jinou pražskou část nebo upravte filtry.".to_string(),
                retry: false,
            },
            None => Self {
                title: "Žádné nabídky nenalezeny".to_string(),
                hint: "Zkuste upravit filtry nebo počkejte na načtení nových nabídek.".to_string(),
                retry: true,
            },
        }
    }

    pub fn empty_area() -> Self {
        Self {
            title: "V této oblasti nejsou žádné nabídky".to_string(),
            hint: "Zkuste posunout mapu nebo změnit filtry.".to_string(),
            retry: false,
        }
    }
}

/// "Label: value" chip for an active filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTag {
    pub label: &'static str,
    pub value: String,
}

pub fn filter_tags(criteria: &FilterCriteria) -> Vec<FilterTag> {
    let mut tags = Vec::new();
    if let Some(disposition) = criteria.disposition {
        tags.push(FilterTag {
            label: "Dispozice",
            value: disposition.label().to_string(),
        });
    }
    if let Some(scraper) = &criteria.scraper {
        tags.push(FilterTag {
            label: "Server",
            value: scraper.clone(),
        });
    }
    if let Some(district) = &criteria.district {
        tags.push(FilterTag {
            label: "Část",
            value: district.clone(),
        });
    }
    if let Some(max_price) = criteria.max_price.filter(|price| *price > 0) {
        tags.push(FilterTag {
            label: "Max cena",
            value: format!("{} Kč", group_digits(max_price)),
        });
    }
    if let Some(sort) = criteria.sort.as_query().map(|_| criteria.sort.label()) {
        tags.push(FilterTag {
            label: "Řazení",
            value: sort.to_string(),
        });
    }
    tags
}

/// Detail view of one offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferModal {
    pub card: OfferCard,
    pub description: String,
    pub images: Vec<String>,
}

/// Listing descriptions sometimes arrive as HTML.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().map(str::trim).filter(|t| !t.is_empty()).collect();
    text.join("\n")
}

impl OfferModal {
    pub fn new(offer: &Offer) -> Self {
        let description = offer
            .description
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| format_area(&html_to_text(text)))
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());
        Self {
            card: OfferCard::from(offer),
            description,
            images: offer.image_url.iter().cloned().collect(),
        }
    }

    /// Merge extra detail fetched from the listing page.
    pub fn with_detail(mut self, detail: &OfferDetail) -> Self {
        if let Some(description) = detail.description.as_deref().filter(|d| !d.trim().is_empty()) {
            self.description = format_area(&html_to_text(description));
        }
        if !detail.images.is_empty() {
            self.images = detail.images.clone();
        }
        self
    }
}

/// Output side of the dashboard.
pub trait Renderer: Send + Sync {
    /// Replace the list with `cards`.
    fn render_list(&self, cards: &[OfferCard]);

    /// Infinite scroll: add cards below the existing ones.
    fn append_cards(&self, cards: &[OfferCard]);

    fn render_empty(&self, state: &EmptyState);

    fn render_error(&self, message: &str, recoverable: bool);

    fn set_loading(&self, loading: bool);

    fn set_active_count(&self, text: &str);

    fn set_active_filters(&self, tags: &[FilterTag]);

    fn set_panel_title(&self, title: &str);

    fn render_map(&self, markers: &[MarkerGroup], view: &MapView);

    fn show_popup(&self, popup: &Popup);

    fn show_modal(&self, modal: &OfferModal);

    /// `None` hides the indicator.
    fn set_processing_indicator(&self, text: Option<&str>);

    fn set_scraper_options(&self, scrapers: &[String]);
}
