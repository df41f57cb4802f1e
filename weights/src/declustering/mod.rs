//! Spatial declustering of points on a sphere.
//!
//! Each point receives a weight inversely proportional to a Gaussian-kernel
//! estimate of the local point density:
//!
//! ```text
//! w_i = prior_i / Σ_j exp(-(Δ_ij / d)²)
//! ```
//!
//! where `Δ_ij` is the great-circle distance in degrees and `d` the reference
//! distance. A small `d` leaves every point alone (all weights ≈ prior), a very
//! large `d` sees every point as a neighbour of every other one (again all
//! weights ≈ prior). In between, the condition number `max(w) / min(w)` rises to
//! a peak and decays. The scan walks `d` outward from `start` in steps of `gap`
//! and settles on the first distance past the peak whose condition number is at
//! most `max_ratio × peak`. When the peak itself is below `1 / max_ratio` that
//! target is out of reach, and once the curve has dropped below
//! `drop_ratio × peak` the scan stops early.
//!
//! Declustering is best effort: when no step satisfies the target within
//! `max_steps`, the step closest to the target is used and the result is flagged
//! as not converged.

mod distance;
mod params;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use hashbrown::HashSet;
use serde::Serialize;

use crate::error::{ConfigError, WeightError, WeightResult};
use crate::geo::{GeoCoord, GeoPoint};
use distance::{condition_number, DistanceMatrix};

pub use params::{DeclusteringParams, DEFAULT_MAX_STEPS};

/// Points closer than this (degrees) to each other are treated as co-located.
const COLOCATED_TOLERANCE_DEG: f64 = 1e-9;

/// One trial of the reference-distance scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanStep {
    pub ref_distance: f64,
    pub cond_num: f64,
}

/// Result of declustering one point set.
#[derive(Debug, Clone, PartialEq)]
pub struct Declustering {
    /// Weight per point tag (prior times inverse density).
    pub weights: BTreeMap<String, f64>,
    /// Chosen reference distance; `None` when no scan was run.
    pub ref_distance: Option<f64>,
    /// `max / min` of the returned weights.
    pub cond_num: f64,
    /// False when the scan stopped without reaching the target condition number.
    pub converged: bool,
    /// Every trial of the scan, in scan order.
    pub scan: Vec<ScanStep>,
    /// Distance (degrees) from the solver center to every point, when a center was set.
    pub center_distances: Option<BTreeMap<String, f64>>,
}

impl Declustering {
    pub fn weight(&self, tag: &str) -> Option<f64> {
        self.weights.get(tag).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeclusteringSolver {
    params: DeclusteringParams,
    center: Option<GeoCoord>,
}

impl DeclusteringSolver {
    pub fn new(params: DeclusteringParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            center: None,
        })
    }

    /// Sets the reference center, e.g. the earthquake when weighting its receivers.
    pub fn with_center(mut self, center: GeoCoord) -> Self {
        self.center = Some(center);
        self
    }

    pub fn params(&self) -> &DeclusteringParams {
        &self.params
    }

    pub fn center(&self) -> Option<&GeoCoord> {
        self.center.as_ref()
    }

    /// Returns the priors unchanged, for callers that disabled spatial correction.
    pub fn priors_only(&self, points: &[GeoPoint]) -> WeightResult<Declustering> {
        check_unique_tags(points)?;
        let priors: Vec<f64> = points.iter().map(GeoPoint::weight).collect();
        Ok(self.finish(points, priors, None, true, Vec::new()))
    }

    pub fn solve(&self, points: &[GeoPoint]) -> WeightResult<Declustering> {
        check_unique_tags(points)?;
        let priors: Vec<f64> = points.iter().map(GeoPoint::weight).collect();

        if points.len() <= 1 {
            return Ok(self.finish(points, priors, None, true, Vec::new()));
        }

        let distances = DistanceMatrix::new(points);
        if distances.max_distance() <= COLOCATED_TOLERANCE_DEG {
            tracing::debug!(
                points = points.len(),
                "All points co-located, declustering skipped"
            );
            return Ok(self.finish(points, priors, None, true, Vec::new()));
        }

        let params = &self.params;
        let mut scan: Vec<ScanStep> = Vec::new();
        let mut peak = 0.0_f64;

        for step in 0..params.max_steps {
            let ref_distance = params.ref_distance(step);
            let weights = distances.kernel_weights(&priors, ref_distance);
            let cond_num = condition_number(&weights);
            scan.push(ScanStep {
                ref_distance,
                cond_num,
            });
            peak = peak.max(cond_num);

            if cond_num < peak && cond_num <= params.max_ratio * peak {
                tracing::debug!(
                    points = points.len(),
                    ref_distance,
                    cond_num,
                    peak,
                    steps = scan.len(),
                    "Declustering converged"
                );
                return Ok(self.finish(points, weights, Some(ref_distance), true, scan));
            }

            if let Some(drop_ratio) = params.drop_ratio {
                let past_peak = cond_num < drop_ratio * peak;
                let unreachable = params.max_ratio * peak <= 1.0;
                if past_peak && unreachable {
                    break;
                }
            }
        }

        let target = params.max_ratio * peak;
        let best = scan
            .iter()
            .copied()
            .min_by(|a, b| {
                (a.cond_num - target)
                    .abs()
                    .total_cmp(&(b.cond_num - target).abs())
            })
            .expect("scan has at least one step");

        tracing::warn!(
            points = points.len(),
            ref_distance = best.ref_distance,
            cond_num = best.cond_num,
            target,
            steps = scan.len(),
            "Declustering did not reach the target condition number, using closest step"
        );

        let weights = distances.kernel_weights(&priors, best.ref_distance);
        Ok(self.finish(points, weights, Some(best.ref_distance), false, scan))
    }

    fn finish(
        &self,
        points: &[GeoPoint],
        weights: Vec<f64>,
        ref_distance: Option<f64>,
        converged: bool,
        scan: Vec<ScanStep>,
    ) -> Declustering {
        let cond_num = condition_number(&weights);
        let center_distances = self.center.map(|center| {
            points
                .iter()
                .map(|p| (p.tag().to_string(), center.distance_deg(p.coord())))
                .collect()
        });
        let weights = points
            .iter()
            .map(|p| p.tag().to_string())
            .zip(weights)
            .collect();

        Declustering {
            weights,
            ref_distance,
            cond_num,
            converged,
            scan,
            center_distances,
        }
    }
}

fn check_unique_tags(points: &[GeoPoint]) -> WeightResult<()> {
    let mut seen = HashSet::with_capacity(points.len());
    for point in points {
        if !seen.insert(point.tag()) {
            return Err(WeightError::DuplicateTag(point.tag().to_string()));
        }
    }
    Ok(())
}
