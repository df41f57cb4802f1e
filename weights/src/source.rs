//! Source (earthquake) weighting across an ensemble of events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::conservation;
use crate::declustering::{DeclusteringParams, DeclusteringSolver, ScanStep};
use crate::error::{ConfigError, Stage, WeightError, WeightResult};
use crate::geo::{GeoCoord, GeoPoint};

/// How event weights are normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceNormalization {
    /// `Σ w_e = N_events`, one weight per event.
    #[default]
    PerEvent,
    /// Renormalized per category so each category keeps its raw window total.
    PerCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// When false, every event gets weight 1.
    pub flag: bool,
    pub params: DeclusteringParams,
    pub normalization: SourceNormalization,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            flag: true,
            params: DeclusteringParams::default(),
            normalization: SourceNormalization::default(),
        }
    }
}

/// One weight per event, normalized so that the weights sum to the number of events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceWeights {
    pub weights: BTreeMap<String, f64>,
    pub ref_distance: Option<f64>,
    pub cond_num: f64,
    pub converged: bool,
    pub scan: Vec<ScanStep>,
}

impl SourceWeights {
    pub fn weight(&self, event: &str) -> Option<f64> {
        self.weights.get(event).copied()
    }
}

/// Event weights renormalized separately for every category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySourceWeights {
    /// The single declustering all categories derive from.
    pub base: SourceWeights,
    /// `category -> event -> weight`; events without windows in a category are absent.
    pub weights: BTreeMap<Category, BTreeMap<String, f64>>,
    /// Raw window total per category, which the weights reproduce.
    pub totals: BTreeMap<Category, f64>,
}

impl CategorySourceWeights {
    pub fn weight(&self, category: &Category, event: &str) -> Option<f64> {
        self.weights.get(category)?.get(event).copied()
    }
}

#[derive(Debug, Clone)]
pub struct SourceWeighter {
    flag: bool,
    normalization: SourceNormalization,
    solver: DeclusteringSolver,
}

impl SourceWeighter {
    pub fn new(config: SourceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            flag: config.flag,
            normalization: config.normalization,
            solver: DeclusteringSolver::new(config.params)?,
        })
    }

    pub fn flag(&self) -> bool {
        self.flag
    }

    pub fn normalization(&self) -> SourceNormalization {
        self.normalization
    }

    /// Declusters the event epicenters and rescales so that `Σ w_e = N_events`.
    pub fn weigh_events(&self, events: &BTreeMap<String, GeoCoord>) -> WeightResult<SourceWeights> {
        let points = events
            .iter()
            .map(|(event, coord)| GeoPoint::from_coord(*coord, event.as_str()))
            .collect::<WeightResult<Vec<_>>>()?;

        let declustering = if self.flag {
            self.solver.solve(&points)?
        } else {
            self.solver.priors_only(&points)?
        };

        let n_events = events.len() as f64;
        let weights = if events.is_empty() {
            BTreeMap::new()
        } else {
            let sum: f64 = declustering.weights.values().sum();
            if !(sum.is_finite() && sum > 0.0) {
                return Err(WeightError::DegenerateSum {
                    stage: Stage::Source,
                    scope: "events".to_string(),
                    sum,
                });
            }
            let factor = n_events / sum;
            let weights: BTreeMap<String, f64> = declustering
                .weights
                .into_iter()
                .map(|(event, w)| (event, w * factor))
                .collect();
            conservation::check(Stage::Source, "events", n_events, weights.values().sum())?;
            weights
        };

        tracing::info!(
            events = events.len(),
            ref_distance = ?declustering.ref_distance,
            cond_num = declustering.cond_num,
            converged = declustering.converged,
            "Source weights computed"
        );

        Ok(SourceWeights {
            weights,
            ref_distance: declustering.ref_distance,
            cond_num: declustering.cond_num,
            converged: declustering.converged,
            scan: declustering.scan,
        })
    }

    /// One declustering over all events, then per category `c`:
    /// `w_ec = w_e × total_c / Σ_e w_e n_ec`.
    ///
    /// `counts` maps each event to its window count per category. Events with no
    /// windows in a category are left out of it; categories with no windows at all
    /// are skipped.
    pub fn weigh_by_category(
        &self,
        events: &BTreeMap<String, GeoCoord>,
        counts: &BTreeMap<String, BTreeMap<Category, usize>>,
    ) -> WeightResult<CategorySourceWeights> {
        if let Some(event) = counts.keys().find(|event| !events.contains_key(*event)) {
            return Err(WeightError::MissingCoordinates(event.clone()));
        }

        let base = self.weigh_events(events)?;

        let mut by_category: BTreeMap<Category, Vec<(&str, f64)>> = BTreeMap::new();
        for (event, categories) in counts {
            for (category, &n) in categories {
                if n > 0 {
                    by_category
                        .entry(category.clone())
                        .or_default()
                        .push((event.as_str(), n as f64));
                }
            }
        }

        let mut weights = BTreeMap::new();
        let mut totals = BTreeMap::new();
        for (category, entries) in by_category {
            let (category_weights, total) =
                normalize_category(&category, &entries, &base.weights)?;
            weights.insert(category.clone(), category_weights);
            totals.insert(category, total);
        }

        Ok(CategorySourceWeights {
            base,
            weights,
            totals,
        })
    }
}

/// Rescales the event weights `base` over the `(event, windows)` entries of one
/// category so that `Σ w_ec n_ec` equals the category's raw total.
fn normalize_category(
    category: &Category,
    entries: &[(&str, f64)],
    base: &BTreeMap<String, f64>,
) -> WeightResult<(BTreeMap<String, f64>, f64)> {
    let total: f64 = entries.iter().map(|(_, n)| n).sum();
    let weighted: f64 = entries.iter().map(|(event, n)| base[*event] * n).sum();
    if !(weighted.is_finite() && weighted > 0.0) {
        return Err(WeightError::DegenerateSum {
            stage: Stage::Source,
            scope: category.to_string(),
            sum: weighted,
        });
    }

    let factor = total / weighted;
    let weights: BTreeMap<String, f64> = entries
        .iter()
        .map(|(event, _)| (event.to_string(), base[*event] * factor))
        .collect();

    let actual =
        conservation::weighted_sum(entries.iter().map(|(event, n)| (weights[*event], *n)));
    conservation::check(Stage::Source, category.to_string(), total, actual)?;

    tracing::debug!(category = %category, total, factor, "Source weights normalized");
    Ok((weights, total))
}
