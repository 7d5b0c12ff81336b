//! Haversine distance and driving time estimation.
//!
//! Uses great-circle distance to estimate travel time between two coordinates.
//! Ignores the road network but needs no external service.

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 50.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate haversine distance between two (lat, lng) points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Driving time in whole seconds between two points at the given speed.
pub fn driving_seconds(from: (f64, f64), to: (f64, f64), speed_kmh: f64) -> i64 {
    let hours = haversine_km(from, to) / speed_kmh;
    (hours * 3600.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_km((39.95, -75.16), (39.95, -75.16));
        assert!(dist < 0.001, "Same point should have ~0 distance");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Philadelphia (39.95, -75.16) to New York (40.71, -74.01)
        // Actual distance ~130 km
        let dist = haversine_km((39.95, -75.16), (40.71, -74.01));
        assert!(dist > 120.0 && dist < 140.0, "PHL to NYC should be ~130km, got {}", dist);
    }

    #[test]
    fn test_driving_time_symmetric() {
        let a = (39.95, -75.16);
        let b = (40.00, -75.10);
        assert_eq!(
            driving_seconds(a, b, DEFAULT_SPEED_KMH),
            driving_seconds(b, a, DEFAULT_SPEED_KMH),
            "Driving time should be symmetric"
        );
    }

    #[test]
    fn test_reasonable_travel_time() {
        // ~1 degree of latitude is ~111.2 km; at 50 km/h that is ~8006 seconds
        let seconds = driving_seconds((0.0, 0.0), (1.0, 0.0), 50.0);
        assert!((7990..8020).contains(&seconds), "got {}", seconds);
    }
}
