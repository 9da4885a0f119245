use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;

use tracing::debug;

use super::popup::Popup;
use super::CoordKey;
use crate::config::MapConfig;
use crate::models::{GeoBounds, LatLng, Offer, PingResponse};

const UNKNOWN_LOCATION: &str = "Neznámá lokace";

/// One map pin: every offer sharing a rounded coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerGroup {
    pub key: CoordKey,
    pub position: LatLng,
    pub location: String,
    offers: Vec<Offer>,
}

impl MarkerGroup {
    fn new(key: CoordKey, position: LatLng, offer: Offer) -> Self {
        let location = if offer.location.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            offer.location.clone()
        };
        Self {
            key,
            position,
            location,
            offers: vec![offer],
        }
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    /// Badge count
    pub fn count(&self) -> usize {
        self.offers.len()
    }

    pub fn contains_link(&self, link: &str) -> bool {
        self.offers.iter().any(|offer| offer.key() == Some(link))
    }

    /// Add `offer` unless its link is already here. With `relabel` the popup
    /// location follows the added offer.
    fn merge(&mut self, offer: Offer, relabel: bool) -> bool {
        match offer.key() {
            Some(link) if !self.contains_link(link) => {
                if relabel && !offer.location.is_empty() {
                    self.location = offer.location.clone();
                }
                self.offers.push(offer);
                true
            }
            _ => false,
        }
    }

    /// Built from the current offers each time it is opened.
    pub fn popup(&self) -> Popup {
        Popup::build(&self.offers, &self.location)
    }
}

/// Reconciles offers into marker groups.
#[derive(Debug)]
pub struct MarkerManager {
    groups: Vec<MarkerGroup>,
    index: HashMap<CoordKey, usize>,
    fallback: CoordKey,
    fallback_center: LatLng,
    fan_out_radius: f64,
    fan_out_slots: u32,
    fanned_out: u32,
}

impl MarkerManager {
    pub fn new(config: &MapConfig) -> Self {
        let fallback_center = config.fallback();
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
            fallback: CoordKey::from(fallback_center),
            fallback_center,
            fan_out_radius: config.fan_out_radius,
            fan_out_slots: config.fan_out_slots.max(1),
            fanned_out: 0,
        }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.index.clear();
        self.fanned_out = 0;
    }

    /// Drop every marker and group `offers` from scratch.
    pub fn rebuild(&mut self, offers: &[Offer]) {
        self.clear();
        let added = self.add(offers, false);
        debug!(offers = offers.len(), markers = self.groups.len(), added, "Rebuilt map markers");
    }

    /// Merge `offers` into the existing markers. Returns how many offers were
    /// added; offers without coordinates or already present are skipped.
    pub fn merge(&mut self, offers: &[Offer]) -> usize {
        self.add(offers, true)
    }

    fn add(&mut self, offers: &[Offer], relabel: bool) -> usize {
        offers
            .iter()
            .filter(|offer| self.place(offer, relabel))
            .count()
    }

    fn place(&mut self, offer: &Offer, relabel: bool) -> bool {
        let (Some(_), Some(position)) = (offer.key(), offer.coords()) else {
            return false;
        };
        let key = CoordKey::from(position);

        if key == self.fallback {
            return self.place_at_fallback(offer, relabel);
        }

        match self.index.get(&key) {
            Some(&slot) => self.groups[slot].merge(offer.clone(), relabel),
            None => {
                self.insert(key, position, offer.clone());
                true
            }
        }
    }

    /// Offers geocoded to the city centre get a pin each, spread on a circle.
    fn place_at_fallback(&mut self, offer: &Offer, relabel: bool) -> bool {
        if let Some(link) = offer.key() {
            if self.groups.iter().any(|group| group.contains_link(link)) {
                return false;
            }
        }

        let slot = self.fanned_out % self.fan_out_slots;
        self.fanned_out += 1;
        let angle = f64::from(slot) * TAU / f64::from(self.fan_out_slots);
        let position = LatLng::new(
            self.fallback_center.lat + self.fan_out_radius * angle.cos(),
            self.fallback_center.lng + self.fan_out_radius * angle.sin(),
        );
        let key = CoordKey::from(position);

        match self.index.get(&key) {
            // The circle is full: share the slot's marker
            Some(&existing) => self.groups[existing].merge(offer.clone(), relabel),
            None => {
                self.insert(key, position, offer.clone());
                true
            }
        }
    }

    fn insert(&mut self, key: CoordKey, position: LatLng, offer: Offer) {
        self.index.insert(key.clone(), self.groups.len());
        self.groups.push(MarkerGroup::new(key, position, offer));
    }

    fn reindex(&mut self) {
        self.index = self
            .groups
            .iter()
            .enumerate()
            .map(|(slot, group)| (group.key.clone(), slot))
            .collect();
    }

    /// Copy ping results onto grouped offers and drop the dead ones. Returns
    /// the number of markers removed because they became empty.
    pub fn apply_ping(&mut self, response: &PingResponse) -> usize {
        let dead: HashSet<&str> = response
            .results
            .iter()
            .filter(|result| !result.is_valid)
            .map(|result| result.link.as_str())
            .collect();

        for group in &mut self.groups {
            for offer in &mut group.offers {
                let Some(result) = response
                    .results
                    .iter()
                    .find(|result| offer.key() == Some(result.link.as_str()))
                else {
                    continue;
                };
                offer.last_ping_is_valid = Some(result.is_valid);
                if let Some(ping_time) = &result.ping_time {
                    offer.last_ping = Some(ping_time.clone());
                }
            }
            group
                .offers
                .retain(|offer| offer.key().map_or(true, |key| !dead.contains(key)));
        }

        let before = self.groups.len();
        self.groups.retain(|group| !group.offers.is_empty());
        let removed = before - self.groups.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn groups(&self) -> &[MarkerGroup] {
        &self.groups
    }

    pub fn get(&self, key: &CoordKey) -> Option<&MarkerGroup> {
        self.index.get(key).map(|&slot| &self.groups[slot])
    }

    pub fn find_by_link(&self, link: &str) -> Option<&MarkerGroup> {
        self.groups.iter().find(|group| group.contains_link(link))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Bounding box of every marker, `None` without markers.
    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::around(self.groups.iter().map(|group| group.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PingResult;

    fn offer_at(link: &str, lat: f64, lng: f64) -> Offer {
        Offer {
            link: Some(link.to_string()),
            location: "Korunní, Praha 2".to_string(),
            lat: Some(lat),
            lng: Some(lng),
            ..Offer::default()
        }
    }

    #[test]
    fn test_rounding_collision_gives_one_marker() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        markers.rebuild(&[offer_at("a", 50.01, 14.01), offer_at("b", 50.01000, 14.01000)]);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.groups()[0].count(), 2);
    }

    #[test]
    fn test_nearby_coordinates_share_a_key() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        markers.rebuild(&[offer_at("a", 50.0812341, 14.4410001), offer_at("b", 50.0812338, 14.4409996)]);
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn test_merge_dedups_by_link() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        markers.rebuild(&[offer_at("a", 50.08, 14.44)]);
        let added = markers.merge(&[offer_at("a", 50.08, 14.44), offer_at("b", 50.08, 14.44)]);
        assert_eq!(added, 1);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.groups()[0].count(), 2);
        assert!(markers.find_by_link("b").is_some());
    }

    #[test]
    fn test_merged_offer_relabels_popup() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        let mut second = offer_at("b", 50.08, 14.44);
        second.location = "Vinohradská, Praha 3".to_string();
        markers.rebuild(&[offer_at("a", 50.08, 14.44), second]);
        assert_eq!(markers.groups()[0].location, "Korunní, Praha 2");

        let mut third = offer_at("c", 50.08, 14.44);
        third.location = "Slezská, Praha 3".to_string();
        markers.merge(&[third]);
        assert_eq!(markers.groups()[0].location, "Slezská, Praha 3");
        assert_eq!(markers.groups()[0].popup().header, "Slezská, Praha 3");
    }

    #[test]
    fn test_offers_without_coordinates_or_link_are_skipped() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        let mut no_link = offer_at("x", 50.08, 14.44);
        no_link.link = None;
        let mut zero = offer_at("z", 0.0, 14.44);
        zero.lat = Some(0.0);
        markers.rebuild(&[no_link, zero, Offer::default()]);
        assert!(markers.is_empty());
        assert_eq!(markers.bounds(), None);
    }

    #[test]
    fn test_fallback_offers_fan_out() {
        let config = MapConfig::default();
        let mut markers = MarkerManager::new(&config);
        let offers: Vec<Offer> = (0..3)
            .map(|i| offer_at(&format!("f{i}"), config.fallback_lat, config.fallback_lng))
            .collect();
        markers.rebuild(&offers);

        assert_eq!(markers.len(), 3);
        for group in markers.groups() {
            let dlat = group.position.lat - config.fallback_lat;
            let dlng = group.position.lng - config.fallback_lng;
            let distance = (dlat * dlat + dlng * dlng).sqrt();
            assert!((distance - config.fan_out_radius).abs() < 1e-9);
            assert_eq!(group.count(), 1);
        }
    }

    #[test]
    fn test_full_fan_out_circle_shares_markers() {
        let config = MapConfig {
            fan_out_slots: 4,
            ..MapConfig::default()
        };
        let mut markers = MarkerManager::new(&config);
        let offers: Vec<Offer> = (0..6)
            .map(|i| offer_at(&format!("f{i}"), config.fallback_lat, config.fallback_lng))
            .collect();
        assert_eq!(markers.merge(&offers), 6);
        assert_eq!(markers.len(), 4);

        // Already placed links are not fanned out again
        assert_eq!(markers.merge(&offers[..1]), 0);
    }

    #[test]
    fn test_ping_drops_dead_offers_and_empty_markers() {
        let mut markers = MarkerManager::new(&MapConfig::default());
        markers.rebuild(&[
            offer_at("a", 50.08, 14.44),
            offer_at("b", 50.08, 14.44),
            offer_at("c", 50.10, 14.40),
        ]);

        let removed = markers.apply_ping(&PingResponse {
            success: true,
            results: vec![
                PingResult {
                    link: "a".to_string(),
                    is_valid: true,
                    ping_time: None,
                },
                PingResult {
                    link: "b".to_string(),
                    is_valid: false,
                    ping_time: None,
                },
                PingResult {
                    link: "c".to_string(),
                    is_valid: false,
                    ping_time: None,
                },
            ],
            invalid_count: 2,
        });

        assert_eq!(removed, 1);
        assert_eq!(markers.len(), 1);
        let group = markers.find_by_link("a").unwrap();
        assert_eq!(group.count(), 1);
        assert_eq!(group.offers()[0].last_ping_is_valid, Some(true));
        assert!(markers.get(&group.key).is_some());
    }
}
