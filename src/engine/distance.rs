//! Distance estimator: miles from the home reference point to a listing's
//! free-text location.
//!
//! A location resolves, in order, by exact (normalised) gazetteer name,
//! by a literal `"lat, lon"` pair, or by its first comma-separated
//! component ("Austin, TX" → "austin"). Unresolvable locations give
//! `None`.

use std::collections::HashMap;

use crate::config::HomeConfig;

const EARTH_RADIUS_MILES: f64 = 3958.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance in miles (haversine).
    pub fn miles_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_MILES * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

#[derive(Debug, Clone)]
pub struct DistanceEstimator {
    home: GeoPoint,
    places: HashMap<String, GeoPoint>,
}

fn normalise(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl DistanceEstimator {
    pub fn new(home: GeoPoint) -> Self {
        Self {
            home,
            places: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &HomeConfig) -> Self {
        cfg.places.iter().fold(Self::new(GeoPoint::new(cfg.lat, cfg.lon)), |est, p| {
            est.with_place(&p.name, GeoPoint::new(p.lat, p.lon))
        })
    }

    pub fn with_place(mut self, name: &str, point: GeoPoint) -> Self {
        self.places.insert(normalise(name), point);
        self
    }

    fn parse_coordinates(location: &str) -> Option<GeoPoint> {
        let (lat, lon) = location.split_once(',')?;
        let point = GeoPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
        point.is_valid().then_some(point)
    }

    pub fn resolve(&self, location: &str) -> Option<GeoPoint> {
        let key = normalise(location);
        if key.is_empty() {
            return None;
        }
        if let Some(p) = self.places.get(&key) {
            return Some(*p);
        }
        if let Some(p) = Self::parse_coordinates(location) {
            return Some(p);
        }
        let first = key.split(',').next().map(str::trim)?;
        self.places.get(first).copied()
    }

    /// Miles from home, rounded to one decimal place.
    pub fn miles_from_home(&self, location: &str) -> Option<f64> {
        let point = self.resolve(location)?;
        Some((self.home.miles_to(&point) * 10.0).round() / 10.0)
    }
}
