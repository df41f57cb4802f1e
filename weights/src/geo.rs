//! Positions on the unit sphere.

use serde::{Deserialize, Serialize};

use crate::error::{WeightError, WeightResult};

/// Latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoord {
    /// Builds a coordinate, rejecting latitudes outside [-90, 90] and non-finite values.
    /// Longitude is wrapped into (-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() || latitude.abs() > 90.0 {
            return None;
        }
        Some(Self {
            latitude,
            longitude: normalize_longitude(longitude),
        })
    }

    /// Great-circle distance in degrees (haversine).
    pub fn distance_deg(&self, other: &GeoCoord) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let central_angle = 2.0 * h.sqrt().min(1.0).asin();
        central_angle.to_degrees()
    }
}

pub fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = longitude.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// A tagged point with a prior weight, the unit the declustering solver works on.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    coord: GeoCoord,
    tag: String,
    weight: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, tag: impl Into<String>) -> WeightResult<Self> {
        let tag = tag.into();
        let coord = GeoCoord::new(latitude, longitude).ok_or_else(|| {
            WeightError::InvalidCoordinate {
                tag: tag.clone(),
                latitude,
                longitude,
            }
        })?;
        Ok(Self {
            coord,
            tag,
            weight: 1.0,
        })
    }

    pub fn from_coord(coord: GeoCoord, tag: impl Into<String>) -> WeightResult<Self> {
        Self::new(coord.latitude, coord.longitude, tag)
    }

    /// Sets the prior weight. Must be finite and strictly positive.
    pub fn with_weight(mut self, weight: f64) -> WeightResult<Self> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(WeightError::InvalidPrior {
                tag: self.tag,
                weight,
            });
        }
        self.weight = weight;
        Ok(self)
    }

    pub fn coord(&self) -> &GeoCoord {
        &self.coord
    }
    pub fn latitude(&self) -> f64 {
        self.coord.latitude
    }
    pub fn longitude(&self) -> f64 {
        self.coord.longitude
    }
    pub fn tag(&self) -> &str {
        &self.tag
    }
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FloatExt;

    #[test]
    fn longitude_is_wrapped() {
        assert!(normalize_longitude(190.0).approximately_eq(-170.0));
        assert!(normalize_longitude(-190.0).approximately_eq(170.0));
        assert!(normalize_longitude(180.0).approximately_eq(180.0));
        assert!(normalize_longitude(-180.0).approximately_eq(180.0));
        assert!(normalize_longitude(360.0).approximately_eq(0.0));
    }

    #[test]
    fn invalid_latitude_is_rejected() {
        assert!(GeoCoord::new(91.0, 0.0).is_none());
        assert!(GeoCoord::new(f64::NAN, 0.0).is_none());
        assert!(matches!(
            GeoPoint::new(-90.5, 10.0, "II.AAK"),
            Err(WeightError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn distances_in_degrees() {
        let origin = GeoCoord::new(0.0, 0.0).unwrap();
        let east = GeoCoord::new(0.0, 90.0).unwrap();
        let pole = GeoCoord::new(90.0, 0.0).unwrap();
        let antipode = GeoCoord::new(0.0, 180.0).unwrap();

        assert!(origin.distance_deg(&east).relative_eq(90.0, 1e-9));
        assert!(origin.distance_deg(&pole).relative_eq(90.0, 1e-9));
        assert!(origin.distance_deg(&antipode).relative_eq(180.0, 1e-9));
        assert!(origin.distance_deg(&origin).approximately_eq(0.0));
    }

    #[test]
    fn distance_across_dateline() {
        let a = GeoCoord::new(10.0, 179.5).unwrap();
        let b = GeoCoord::new(10.0, -179.5).unwrap();
        let d = a.distance_deg(&b);
        assert!(d < 1.0 && d > 0.9, "distance across the dateline was {d}");
    }

    #[test]
    fn prior_weight_must_be_positive() {
        let point = GeoPoint::new(0.0, 0.0, "ev").unwrap();
        assert!(point.weight().approximately_eq(1.0));
        assert!(point.clone().with_weight(0.0).is_err());
        assert!(point.clone().with_weight(f64::INFINITY).is_err());
        assert!(point.with_weight(2.5).unwrap().weight().approximately_eq(2.5));
    }
}
