//! Map side of the dashboard: marker grouping, popups and the camera.

use std::fmt;

use crate::models::LatLng;

pub mod markers;
pub mod popup;
pub mod view;

pub use markers::{MarkerGroup, MarkerManager};
pub use popup::Popup;
pub use view::MapView;

/// Coordinate rounded to 5 decimal places (about a metre), the identity of a
/// marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey(String);

impl From<LatLng> for CoordKey {
    fn from(point: LatLng) -> Self {
        Self(format!("{:.5},{:.5}", point.lat, point.lng))
    }
}

impl CoordKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_key_rounds_to_five_places() {
        assert_eq!(CoordKey::from(LatLng::new(50.01, 14.01)).as_str(), "50.01000,14.01000");
        assert_eq!(
            CoordKey::from(LatLng::new(50.0812341, 14.4409996)),
            CoordKey::from(LatLng::new(50.0812338, 14.4410001))
        );
    }
}
