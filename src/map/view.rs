use crate::config::MapConfig;
use crate::models::{GeoBounds, LatLng};

const TILE_SIZE: f64 = 256.0;
const VIEWPORT_WIDTH_PX: f64 = 1024.0;
const VIEWPORT_HEIGHT_PX: f64 = 768.0;
pub const MAX_ZOOM: u8 = 18;
pub const DEFAULT_ZOOM: u8 = 11;
/// Zoom used when jumping to a single offer.
pub const FOCUS_ZOOM: u8 = 16;

/// Camera over the offer map plus the guards deciding when the dashboard may
/// move it on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    center: LatLng,
    zoom: u8,
    interacted: bool,
    initial_fit_done: bool,
    popup_open: bool,
    fit_padding: f64,
    district_zoom: u8,
    min_zoom: u8,
}

impl MapView {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            center: config.fallback(),
            zoom: DEFAULT_ZOOM,
            interacted: false,
            initial_fit_done: false,
            popup_open: false,
            fit_padding: config.fit_padding,
            district_zoom: config.district_zoom,
            min_zoom: config.min_zoom,
        }
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn user_interacted(&self) -> bool {
        self.interacted
    }

    pub fn set_popup_open(&mut self, open: bool) {
        self.popup_open = open;
    }

    /// Degrees covered by the viewport at the current zoom (Web Mercator).
    fn span(&self, zoom: u8) -> (f64, f64) {
        let lng_span = VIEWPORT_WIDTH_PX * 360.0 / (TILE_SIZE * 2f64.powi(i32::from(zoom)));
        let lat_span = lng_span * (VIEWPORT_HEIGHT_PX / VIEWPORT_WIDTH_PX) * self.center.lat.to_radians().cos();
        (lat_span, lng_span)
    }

    /// Visible area, what `/api/offers-nearby` is asked about.
    pub fn bounds(&self) -> GeoBounds {
        let (lat_span, lng_span) = self.span(self.zoom);
        GeoBounds {
            north: self.center.lat + lat_span / 2.0,
            south: self.center.lat - lat_span / 2.0,
            east: self.center.lng + lng_span / 2.0,
            west: self.center.lng - lng_span / 2.0,
        }
    }

    pub fn contains(&self, point: LatLng) -> bool {
        self.bounds().contains(point)
    }

    /// Pan or zoom done by the user. Disables automatic fitting.
    pub fn user_moved(&mut self, center: LatLng, zoom: u8) {
        self.interacted = true;
        self.center = center;
        self.zoom = zoom.clamp(1, MAX_ZOOM);
    }

    /// Centre on `bounds` padded by the configured ratio, at the largest zoom
    /// that still shows all of it.
    pub fn fit_bounds(&mut self, bounds: GeoBounds) {
        let padded = bounds.pad(self.fit_padding);
        self.center = padded.center();
        let lat_needed = (padded.north - padded.south).abs();
        let lng_needed = (padded.east - padded.west).abs();
        self.zoom = (1..=MAX_ZOOM)
            .rev()
            .find(|zoom| {
                let (lat_span, lng_span) = self.span(*zoom);
                lat_span >= lat_needed && lng_span >= lng_needed
            })
            .unwrap_or(1);
    }

    /// Fit after the first successful load. Only once, and never over a user
    /// gesture or an open popup.
    pub fn auto_fit(&mut self, markers: Option<GeoBounds>) -> bool {
        let Some(bounds) = markers else {
            return false;
        };
        if self.interacted || self.popup_open || self.initial_fit_done {
            return false;
        }
        self.fit_bounds(bounds);
        self.initial_fit_done = true;
        true
    }

    /// Fit after new scrape results arrive. Repeats, but still yields to the
    /// user.
    pub fn refit(&mut self, markers: Option<GeoBounds>) -> bool {
        match markers {
            Some(bounds) if !self.interacted && !self.popup_open => {
                self.fit_bounds(bounds);
                true
            }
            _ => false,
        }
    }

    /// "Show all": forget the user's gestures so the next load fits again.
    pub fn reset_fit(&mut self) {
        self.interacted = false;
        self.initial_fit_done = false;
    }

    /// Jump to a district centre. Counts as a deliberate move, so the
    /// following load doesn't fit it away.
    pub fn select_district(&mut self, center: LatLng) {
        self.center = center;
        self.zoom = self.district_zoom;
        self.interacted = true;
    }

    /// Centre on one offer, zooming in to at least street level.
    pub fn focus(&mut self, position: LatLng) {
        self.center = position;
        self.zoom = self.zoom.max(FOCUS_ZOOM);
        self.popup_open = true;
    }

    pub fn zoom_out(&mut self) {
        self.zoom = self.zoom.saturating_sub(2).max(self.min_zoom);
    }
}
