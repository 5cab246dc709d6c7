//! Short-range geographic helpers.
//!
//! Distances here are a flat equirectangular approximation. Every leg the
//! vehicle flies is a few hundred metres at most, where the error is far below
//! GPS noise.

/// Metres per degree of latitude/longitude used by the planar approximation.
pub const METRES_PER_DEGREE: f64 = 1.113195e5;

/// Equatorial earth radius (WGS-84), metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Geographic position: degrees, degrees, metres above home.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GeoPosition {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    pub fn with_alt(self, alt: f64) -> Self {
        Self { alt, ..self }
    }
}

/// Ground distance in metres between two positions (altitude ignored).
pub fn distance_metres(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let dlat = b.lat - a.lat;
    let dlon = b.lon - a.lon;
    (dlat * dlat + dlon * dlon).sqrt() * METRES_PER_DEGREE
}

/// Position `d_north`/`d_east` metres away from `origin`, same altitude.
pub fn offset_location(origin: &GeoPosition, d_north: f64, d_east: f64) -> GeoPosition {
    let dlat = d_north / EARTH_RADIUS_M;
    let dlon = d_east / (EARTH_RADIUS_M * (origin.lat.to_radians()).cos());
    GeoPosition {
        lat: origin.lat + dlat.to_degrees(),
        lon: origin.lon + dlon.to_degrees(),
        alt: origin.alt,
    }
}

/// North/east offset in metres of `to` relative to `from`, inverse of
/// `offset_location`.
pub fn ned_offset(from: &GeoPosition, to: &GeoPosition) -> (f64, f64) {
    let north = (to.lat - from.lat).to_radians() * EARTH_RADIUS_M;
    let east = (to.lon - from.lon).to_radians() * EARTH_RADIUS_M * from.lat.to_radians().cos();
    (north, east)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let origin = GeoPosition::new(0.0, 0.0, 0.0);
        assert_eq!(distance_metres(&origin, &origin), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let points = [
            GeoPosition::new(40.2302201, 29.0096884, 14.0),
            GeoPosition::new(40.2305318, 29.0091191, 14.0),
            GeoPosition::new(-12.5, 130.25, 0.0),
            GeoPosition::new(0.0, 0.0, 3.0),
        ];
        for a in &points {
            for b in &points {
                assert_eq!(distance_metres(a, b), distance_metres(b, a));
            }
        }
    }

    #[test]
    fn distance_ignores_altitude() {
        let a = GeoPosition::new(40.0, 29.0, 0.0);
        assert_eq!(distance_metres(&a, &a.with_alt(25.0)), 0.0);
    }

    #[test]
    fn offset_round_trips_through_distance() {
        let origin = GeoPosition::new(40.2302201, 29.0096884, 10.0);
        let moved = offset_location(&origin, 30.0, 0.0);
        let d = distance_metres(&origin, &moved);
        assert!((d - 30.0).abs() < 0.2, "distance {}", d);

        let (north, east) = ned_offset(&origin, &offset_location(&origin, -4.0, 7.5));
        assert!((north + 4.0).abs() < 1e-6);
        assert!((east - 7.5).abs() < 1e-6);
    }
}
