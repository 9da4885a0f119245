use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod api;

pub use api::*;

/// Asking price as the backend sent it.
///
/// Sources disagree on the format ("12 000 Kč", `12000`, `"12000"`), so the raw
/// text is kept for display and [`Price::amount`] is used for comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Price(String);

impl Price {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Numeric value with every non-digit stripped. Unparsable prices are 0.
    pub fn amount(&self) -> u64 {
        let digits: String = self.0.chars().filter(char::is_ascii_digit).collect();
        digits.parse().unwrap_or(0)
    }
}

impl From<u64> for Price {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Int(n)) => Self(n.to_string()),
            Some(Raw::Float(f)) => Self(format!("{}", f.trunc() as i64)),
            Some(Raw::Text(s)) => Self(s),
            None => Self::default(),
        })
    }
}

/// Coordinates arrive as numbers, numeric strings or null.
fn deserialize_coord<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// A point on the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Rectangular map area, as sent to `/api/offers-nearby`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBounds {
    /// Smallest bounds containing every point, `None` for an empty input.
    pub fn around(points: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Self {
            north: first.lat,
            south: first.lat,
            east: first.lng,
            west: first.lng,
        };
        for point in points {
            bounds.north = bounds.north.max(point.lat);
            bounds.south = bounds.south.min(point.lat);
            bounds.east = bounds.east.max(point.lng);
            bounds.west = bounds.west.min(point.lng);
        }
        Some(bounds)
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat <= self.north
            && point.lat >= self.south
            && point.lng <= self.east
            && point.lng >= self.west
    }

    /// Grow each side by `ratio` of the span, like Leaflet's `LatLngBounds.pad`.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south).abs() * ratio;
        let lng_pad = (self.east - self.west).abs() * ratio;
        Self {
            north: self.north + lat_pad,
            south: self.south - lat_pad,
            east: self.east + lng_pad,
            west: self.west - lng_pad,
        }
    }

    pub fn center(&self) -> LatLng {
        LatLng::new((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }
}

/// Core rental listing data model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Identity of the listing. Offers without one cannot be deduplicated.
    #[serde(default)]
    pub link: Option<String>,
    /// Older responses use `url` instead of `link`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "address")]
    pub location: String,
    #[serde(default)]
    pub city_part: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub price: Price,
    #[serde(default, deserialize_with = "deserialize_coord")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_coord")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub scraper: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub last_ping: Option<String>,
    /// `None` = never checked, `Some(true)` = live, `Some(false)` = gone.
    #[serde(default)]
    pub last_ping_is_valid: Option<bool>,
}

impl Offer {
    /// Identity used for every dedup and lookup.
    pub fn key(&self) -> Option<&str> {
        self.link
            .as_deref()
            .or(self.url.as_deref())
            .filter(|link| !link.is_empty())
    }

    /// Usable coordinates. Missing, non-finite and zero values don't count.
    pub fn coords(&self) -> Option<LatLng> {
        let (lat, lng) = (self.lat?, self.lng?);
        if !lat.is_finite() || !lng.is_finite() || lat == 0.0 || lng == 0.0 {
            return None;
        }
        Some(LatLng::new(lat, lng))
    }

    /// `last_ping`, then `created_at`, then `timestamp`.
    pub fn last_update(&self) -> Option<&str> {
        [&self.last_ping, &self.created_at, &self.timestamp]
            .into_iter()
            .filter_map(|value| value.as_deref())
            .find(|value| !value.is_empty())
    }

    pub fn is_marked_dead(&self) -> bool {
        self.last_ping_is_valid == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_price_amount_strips_formatting() {
        assert_eq!(Price::from("12 000 Kč").amount(), 12_000);
        assert_eq!(Price::from("dohodou").amount(), 0);
        assert_eq!(Price::from(25_500_u64).amount(), 25_500);
    }

    #[test]
    fn test_offer_accepts_loose_backend_json() {
        let offer: Offer = serde_json::from_value(json!({
            "link": "https://example.cz/1",
            "title": "Byt 2+kk, 54 m²",
            "address": "Křížová, Praha 5",
            "price": 18500.0,
            "lat": "50.0667",
            "lng": null,
            "scraper": "Sreality",
            "last_ping_is_valid": null
        }))
        .unwrap();

        assert_eq!(offer.location, "Křížová, Praha 5");
        assert_eq!(offer.price.amount(), 18_500);
        assert_eq!(offer.lat, Some(50.0667));
        assert_eq!(offer.lng, None);
        assert_eq!(offer.coords(), None);
        assert_eq!(offer.last_ping_is_valid, None);
    }

    #[test]
    fn test_key_falls_back_to_url() {
        let offer = Offer {
            url: Some("https://example.cz/2".to_string()),
            ..Offer::default()
        };
        assert_eq!(offer.key(), Some("https://example.cz/2"));
        assert_eq!(Offer::default().key(), None);
    }

    #[test]
    fn test_last_update_prefers_ping_time() {
        let offer = Offer {
            created_at: Some("2025-01-01T10:00:00".to_string()),
            last_ping: Some("2025-02-01T10:00:00".to_string()),
            ..Offer::default()
        };
        assert_eq!(offer.last_update(), Some("2025-02-01T10:00:00"));
    }

    #[test]
    fn test_bounds_pad_and_contains() {
        let bounds = GeoBounds::around([LatLng::new(50.0, 14.0), LatLng::new(50.2, 14.4)]).unwrap();
        let padded = bounds.pad(0.1);
        assert!((padded.north - 50.22).abs() < 1e-9);
        assert!((padded.west - 13.96).abs() < 1e-9);
        assert!(padded.contains(LatLng::new(50.21, 14.41)));
        assert!(!bounds.contains(LatLng::new(50.21, 14.41)));
    }
}
