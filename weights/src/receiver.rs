//! Receiver (station) weighting for one earthquake and one period band.

use std::collections::BTreeMap;

use common::parallel::{try_par_map_keyed, DEFAULT_MAX_CONCURRENT};
use serde::Serialize;

use crate::category::{component_of, Category};
use crate::conservation;
use crate::declustering::{Declustering, DeclusteringParams, DeclusteringSolver, ScanStep};
use crate::error::{ConfigError, Stage, WeightError, WeightResult};
use crate::geo::{GeoCoord, GeoPoint};

/// Orientation codes tried, in order, when a channel has no coordinates of its own.
const FALLBACK_ORIENTATIONS: [char; 3] = ['E', '1', 'Z'];

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// When false, every receiver gets the same raw weight.
    pub flag: bool,
    pub params: DeclusteringParams,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            flag: true,
            params: DeclusteringParams::default(),
        }
    }
}

/// Receiver weights of one category (one component of one band) of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentWeights {
    pub category: Category,
    /// Normalized weight per channel id.
    pub weights: BTreeMap<String, f64>,
    pub window_counts: BTreeMap<String, usize>,
    pub total_windows: usize,
    pub ref_distance: Option<f64>,
    pub cond_num: f64,
    pub converged: bool,
    pub scan: Vec<ScanStep>,
    /// Epicentral distance (degrees) per channel id.
    pub distances: BTreeMap<String, f64>,
}

impl ComponentWeights {
    pub fn weight(&self, channel_id: &str) -> Option<f64> {
        self.weights.get(channel_id).copied()
    }

    pub fn min_weight(&self) -> f64 {
        self.weights.values().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_weight(&self) -> f64 {
        self.weights.values().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Receiver weights of every category of one event.
pub type ReceiverLayer = BTreeMap<Category, ComponentWeights>;

#[derive(Debug, Clone)]
pub struct ReceiverWeighter {
    flag: bool,
    solver: DeclusteringSolver,
}

impl ReceiverWeighter {
    pub fn new(config: ReceiverConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            flag: config.flag,
            solver: DeclusteringSolver::new(config.params)?,
        })
    }

    pub fn flag(&self) -> bool {
        self.flag
    }

    /// Weighs the receivers of one event in one period band.
    ///
    /// `stations` maps channel ids to coordinates, `counts` maps channel ids to
    /// their window counts. Every component is an independent category and is
    /// weighted in parallel. Channels without windows are left out.
    pub fn weigh(
        &self,
        band: &str,
        center: GeoCoord,
        stations: &BTreeMap<String, GeoCoord>,
        counts: &BTreeMap<String, usize>,
    ) -> WeightResult<ReceiverLayer> {
        let mut groups: BTreeMap<Category, Vec<(String, GeoCoord, usize)>> = BTreeMap::new();
        for (channel_id, &count) in counts {
            if count == 0 {
                continue;
            }
            let coord = lookup_coordinates(stations, channel_id)?;
            groups
                .entry(Category::new(band, component_of(channel_id)))
                .or_default()
                .push((channel_id.clone(), coord, count));
        }

        let solver = self.solver.clone().with_center(center);
        try_par_map_keyed(&groups, DEFAULT_MAX_CONCURRENT, |category, channels| {
            self.weigh_component(&solver, category, channels)
        })
    }

    fn weigh_component(
        &self,
        solver: &DeclusteringSolver,
        category: &Category,
        channels: &[(String, GeoCoord, usize)],
    ) -> WeightResult<ComponentWeights> {
        let points = channels
            .iter()
            .map(|(channel_id, coord, _)| GeoPoint::from_coord(*coord, channel_id.as_str()))
            .collect::<WeightResult<Vec<_>>>()?;

        let Declustering {
            weights: raw,
            ref_distance,
            cond_num,
            converged,
            scan,
            center_distances,
        } = if self.flag {
            solver.solve(&points)?
        } else {
            solver.priors_only(&points)?
        };

        let window_counts: BTreeMap<String, usize> = channels
            .iter()
            .map(|(channel_id, _, count)| (channel_id.clone(), *count))
            .collect();
        let total_windows: usize = window_counts.values().sum();

        let weighted = conservation::weighted_sum(
            raw.iter().map(|(id, w)| (*w, window_counts[id] as f64)),
        );
        if !(weighted.is_finite() && weighted > 0.0) {
            return Err(WeightError::DegenerateSum {
                stage: Stage::Receiver,
                scope: category.to_string(),
                sum: weighted,
            });
        }
        let factor = total_windows as f64 / weighted;
        let weights: BTreeMap<String, f64> =
            raw.into_iter().map(|(id, w)| (id, w * factor)).collect();

        let actual = conservation::weighted_sum(
            weights.iter().map(|(id, w)| (*w, window_counts[id] as f64)),
        );
        conservation::check(
            Stage::Receiver,
            category.to_string(),
            total_windows as f64,
            actual,
        )?;

        tracing::debug!(
            category = %category,
            channels = weights.len(),
            windows = total_windows,
            ?ref_distance,
            cond_num,
            converged,
            "Receiver weights computed"
        );

        Ok(ComponentWeights {
            category: category.clone(),
            weights,
            window_counts,
            total_windows,
            ref_distance,
            cond_num,
            converged,
            scan,
            distances: center_distances.unwrap_or_default(),
        })
    }
}

/// Coordinates of `channel_id`, falling back to the E, 1 and Z channels of the same
/// station and location code (`II.AAK.00.BHR` -> `BHE` -> `BH1` -> `BHZ`).
fn lookup_coordinates(
    stations: &BTreeMap<String, GeoCoord>,
    channel_id: &str,
) -> WeightResult<GeoCoord> {
    if let Some(coord) = stations.get(channel_id) {
        return Ok(*coord);
    }

    let mut chars = channel_id.chars();
    if chars.next_back().is_some() {
        let prefix = chars.as_str();
        for orientation in FALLBACK_ORIENTATIONS {
            let candidate = format!("{prefix}{orientation}");
            if let Some(coord) = stations.get(&candidate) {
                return Ok(*coord);
            }
        }
    }

    Err(WeightError::MissingCoordinates(channel_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FloatExt;

    fn coord(lat: f64, lon: f64) -> GeoCoord {
        GeoCoord::new(lat, lon).unwrap()
    }

    fn stations(entries: &[(&str, f64, f64)]) -> BTreeMap<String, GeoCoord> {
        entries
            .iter()
            .map(|(id, lat, lon)| (id.to_string(), coord(*lat, *lon)))
            .collect()
    }

    fn counts(entries: &[(&str, usize)]) -> BTreeMap<String, usize> {
        entries.iter().map(|(id, n)| (id.to_string(), *n)).collect()
    }

    fn disabled() -> ReceiverWeighter {
        ReceiverWeighter::new(ReceiverConfig {
            flag: false,
            ..Default::default()
        })
        .unwrap()
    }

    fn enabled() -> ReceiverWeighter {
        ReceiverWeighter::new(ReceiverConfig::default()).unwrap()
    }

    #[test]
    fn test_disabled_weighting_gives_unit_weights() {
        let stations = stations(&[
            ("II.A.00.BHZ", 0.0, 0.0),
            ("II.B.00.BHZ", 0.0, 0.01),
            ("II.C.00.BHZ", 0.0, 90.0),
        ]);
        let counts = counts(&[("II.A.00.BHZ", 10), ("II.B.00.BHZ", 5), ("II.C.00.BHZ", 5)]);

        let layer = disabled()
            .weigh("17_40", coord(0.0, 0.0), &stations, &counts)
            .unwrap();
        let bhz = &layer[&Category::new("17_40", "BHZ")];

        assert_eq!(bhz.total_windows, 20);
        for id in ["II.A.00.BHZ", "II.B.00.BHZ", "II.C.00.BHZ"] {
            assert!(bhz.weight(id).unwrap().approximately_eq(1.0));
        }
        assert!(bhz.scan.is_empty());
    }

    #[test]
    fn test_clustered_stations_are_downweighted() {
        let stations = stations(&[
            ("II.A.00.BHZ", 0.0, 0.0),
            ("II.B.00.BHZ", 0.0, 0.01),
            ("II.C.00.BHZ", 0.0, 90.0),
        ]);
        let counts = counts(&[("II.A.00.BHZ", 10), ("II.B.00.BHZ", 10), ("II.C.00.BHZ", 10)]);

        let layer = enabled()
            .weigh("17_40", coord(0.0, 45.0), &stations, &counts)
            .unwrap();
        let bhz = &layer[&Category::new("17_40", "BHZ")];

        let a = bhz.weight("II.A.00.BHZ").unwrap();
        let c = bhz.weight("II.C.00.BHZ").unwrap();
        assert!(c > a);

        let weighted: f64 = bhz.weights.values().map(|w| w * 10.0).sum();
        assert!(weighted.relative_eq(30.0, 1e-9));
        assert!(bhz.distances["II.C.00.BHZ"].relative_eq(45.0, 1e-9));
    }

    #[test]
    fn test_components_are_independent_categories() {
        let stations = stations(&[
            ("IU.X.00.BHZ", 10.0, 10.0),
            ("IU.X.00.BHE", 10.0, 10.0),
            ("IU.Y.00.BHZ", -10.0, 40.0),
            ("IU.Y.00.BHE", -10.0, 40.0),
        ]);
        let counts = counts(&[
            ("IU.X.00.BHZ", 4),
            ("IU.Y.00.BHZ", 2),
            ("IU.X.00.BHR", 3),
            ("IU.Y.00.BHT", 1),
        ]);

        let layer = enabled()
            .weigh("40_100", coord(0.0, 0.0), &stations, &counts)
            .unwrap();

        assert_eq!(layer.len(), 3);
        for component in layer.values() {
            let weighted: f64 = component
                .weights
                .iter()
                .map(|(id, w)| w * component.window_counts[id] as f64)
                .sum();
            assert!(weighted.relative_eq(component.total_windows as f64, 1e-9));
        }
        let bhr = &layer[&Category::new("40_100", "BHR")];
        assert!(bhr.weight("IU.X.00.BHR").unwrap().approximately_eq(1.0));
    }

    #[test]
    fn test_zero_window_channels_are_excluded() {
        let stations = stations(&[("II.A.00.BHZ", 0.0, 0.0), ("II.B.00.BHZ", 5.0, 5.0)]);
        let counts = counts(&[("II.A.00.BHZ", 3), ("II.B.00.BHZ", 0)]);

        let layer = enabled()
            .weigh("17_40", coord(0.0, 0.0), &stations, &counts)
            .unwrap();
        let bhz = &layer[&Category::new("17_40", "BHZ")];

        assert_eq!(bhz.weights.len(), 1);
        assert!(bhz.weight("II.B.00.BHZ").is_none());
        assert!(bhz.weight("II.A.00.BHZ").unwrap().approximately_eq(1.0));
    }

    #[test]
    fn test_coordinate_fallback_order() {
        let stations = stations(&[("II.AAK.00.BH1", 1.0, 1.0), ("II.AAK.00.BHZ", 2.0, 2.0)]);
        let found = lookup_coordinates(&stations, "II.AAK.00.BHR").unwrap();
        assert!(found.latitude.approximately_eq(1.0));

        let with_e = {
            let mut s = stations.clone();
            s.insert("II.AAK.00.BHE".to_string(), coord(3.0, 3.0));
            s
        };
        let found = lookup_coordinates(&with_e, "II.AAK.00.BHT").unwrap();
        assert!(found.latitude.approximately_eq(3.0));
    }

    #[test]
    fn test_missing_coordinates_is_an_error() {
        let stations = stations(&[("II.AAK.10.BHZ", 1.0, 1.0)]);
        let counts = counts(&[("II.AAK.00.BHR", 2)]);

        let err = enabled()
            .weigh("17_40", coord(0.0, 0.0), &stations, &counts)
            .unwrap_err();
        assert!(matches!(err, WeightError::MissingCoordinates(id) if id == "II.AAK.00.BHR"));
    }

    #[test]
    fn test_empty_band_gives_empty_layer() {
        let layer = enabled()
            .weigh("17_40", coord(0.0, 0.0), &BTreeMap::new(), &BTreeMap::new())
            .unwrap();
        assert!(layer.is_empty());
    }
}
