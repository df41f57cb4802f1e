use rayon::prelude::*;

use crate::geo::GeoPoint;

/// Dense matrix of squared pairwise great-circle distances (degrees squared).
#[derive(Debug)]
pub(crate) struct DistanceMatrix {
    n: usize,
    squared: Vec<f64>,
    max_distance: f64,
}

impl DistanceMatrix {
    pub fn new(points: &[GeoPoint]) -> Self {
        let n = points.len();
        let mut squared = vec![0.0; n * n];
        if n > 0 {
            squared.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                let origin = points[i].coord();
                for (j, value) in row.iter_mut().enumerate() {
                    if i != j {
                        let d = origin.distance_deg(points[j].coord());
                        *value = d * d;
                    }
                }
            });
        }
        let max_distance = squared.iter().copied().fold(0.0_f64, f64::max).sqrt();

        Self {
            n,
            squared,
            max_distance,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Inverse-density weights for reference distance `ref_distance`:
    /// `prior_i / Σ_j exp(-(Δ_ij / ref_distance)²)`.
    ///
    /// The self term contributes 1, so the denominator never drops below 1.
    pub fn kernel_weights(&self, priors: &[f64], ref_distance: f64) -> Vec<f64> {
        assert_eq!(priors.len(), self.n, "prior count must match point count");
        assert!(ref_distance > 0.0, "reference distance must be positive");

        let inv_sq = 1.0 / (ref_distance * ref_distance);
        self.squared
            .par_chunks(self.n.max(1))
            .zip(priors.par_iter())
            .map(|(row, prior)| {
                let density: f64 = row.iter().map(|&sq| (-sq * inv_sq).exp()).sum();
                prior / density
            })
            .collect()
    }
}

/// `max(w) / min(w)`; 1.0 for an empty set.
pub(crate) fn condition_number(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 1.0;
    }
    let (min, max) = weights
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &w| {
            (min.min(w), max.max(w))
        });
    max / min
}
