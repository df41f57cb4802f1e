//! Read-only diagnostics over a finished weighting run.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::category::{Category, CategoryWeights};
use crate::combine::{CombinedWeights, SourceLayer};
use crate::receiver::ReceiverLayer;

pub const HISTOGRAM_BINS: usize = 50;
/// Width (degrees) of one bin of the weight-vs-distance profile.
pub const DISTANCE_BIN_DEG: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Equal-width histogram of `values` over `[min, max]`. A constant sample lands
    /// entirely in the first bin.
    pub fn new(values: &[f64], bins: usize) -> Self {
        let mut counts = vec![0; bins];
        if values.is_empty() || bins == 0 {
            return Self {
                min: 0.0,
                max: 0.0,
                counts,
            };
        }

        let (min, max) = min_max(values.iter().copied());
        let width = (max - min) / bins as f64;
        for &value in values {
            let index = if width > 0.0 {
                (((value - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[index] += 1;
        }

        Self { min, max, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub channels: usize,
    pub windows: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    pub cond_num: f64,
    /// Smallest and largest receiver reference distance across events.
    pub ref_distance_range: Option<(f64, f64)>,
    /// Smallest and largest receiver condition number across events.
    pub receiver_cond_num_range: (f64, f64),
    /// Events whose receiver scan did not converge.
    pub unconverged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallSummary {
    pub events: usize,
    pub receivers: usize,
    pub windows: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    pub cond_num: f64,
    pub weighted_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub min: f64,
    pub max: f64,
    pub cond_num: f64,
}

impl LayerSummary {
    fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }
        let (min, max) = min_max(values.into_iter());
        Some(Self {
            min,
            max,
            cond_num: max / min,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceBin {
    pub lower: f64,
    pub upper: f64,
    pub channels: usize,
    pub mean_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReport {
    pub overall: OverallSummary,
    pub categories: BTreeMap<Category, CategorySummary>,
    pub category_layer: Option<LayerSummary>,
    pub source_layer: Option<LayerSummary>,
    pub weight_histogram: Histogram,
    pub window_histogram: Histogram,
    pub distance_profile: Vec<DistanceBin>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WeightAnalyzer;

impl WeightAnalyzer {
    pub fn analyze(
        &self,
        combined: &CombinedWeights,
        receivers: &BTreeMap<String, ReceiverLayer>,
        source: Option<SourceLayer<'_>>,
        categories: Option<&CategoryWeights>,
    ) -> WeightReport {
        let weights: Vec<f64> = combined.iter().map(|(_, _, r)| r.weight()).collect();
        let windows: Vec<f64> = combined.iter().map(|(_, _, r)| r.windows() as f64).collect();

        let (min_weight, max_weight) = if weights.is_empty() {
            (0.0, 0.0)
        } else {
            min_max(weights.iter().copied())
        };
        let overall = OverallSummary {
            events: combined.events().count(),
            receivers: weights.len(),
            windows: combined.iter().map(|(_, _, r)| r.windows()).sum(),
            min_weight,
            max_weight,
            cond_num: if min_weight > 0.0 { max_weight / min_weight } else { 1.0 },
            weighted_sum: combined.weighted_total(),
        };

        let report = WeightReport {
            overall,
            categories: summarize_categories(combined, receivers),
            category_layer: categories
                .and_then(|c| LayerSummary::from_values(c.weights.values().copied())),
            source_layer: source.and_then(|s| match s {
                SourceLayer::PerEvent(w) => LayerSummary::from_values(w.weights.values().copied()),
                SourceLayer::PerCategory(w) => LayerSummary::from_values(
                    w.weights.values().flat_map(|events| events.values().copied()),
                ),
            }),
            weight_histogram: Histogram::new(&weights, HISTOGRAM_BINS),
            window_histogram: Histogram::new(&windows, HISTOGRAM_BINS),
            distance_profile: distance_profile(combined, receivers),
        };

        log_report(&report);
        report
    }
}

fn summarize_categories(
    combined: &CombinedWeights,
    receivers: &BTreeMap<String, ReceiverLayer>,
) -> BTreeMap<Category, CategorySummary> {
    let mut grouped: BTreeMap<&Category, Vec<(f64, usize)>> = BTreeMap::new();
    for (_, category, record) in combined.iter() {
        grouped
            .entry(category)
            .or_default()
            .push((record.weight(), record.windows()));
    }

    grouped
        .into_iter()
        .map(|(category, records)| {
            let (min_weight, max_weight) = min_max(records.iter().map(|(w, _)| *w));
            let components: Vec<_> = receivers
                .values()
                .filter_map(|layer| layer.get(category))
                .collect();
            let ref_distances: Vec<f64> =
                components.iter().filter_map(|c| c.ref_distance).collect();

            let summary = CategorySummary {
                channels: records.len(),
                windows: records.iter().map(|(_, n)| n).sum(),
                min_weight,
                max_weight,
                cond_num: max_weight / min_weight,
                ref_distance_range: (!ref_distances.is_empty())
                    .then(|| min_max(ref_distances.iter().copied())),
                receiver_cond_num_range: if components.is_empty() {
                    (1.0, 1.0)
                } else {
                    min_max(components.iter().map(|c| c.cond_num))
                },
                unconverged: components.iter().filter(|c| !c.converged).count(),
            };
            (category.clone(), summary)
        })
        .collect()
}

fn distance_profile(
    combined: &CombinedWeights,
    receivers: &BTreeMap<String, ReceiverLayer>,
) -> Vec<DistanceBin> {
    let bins = (180.0 / DISTANCE_BIN_DEG).ceil() as usize;
    let mut sums = vec![(0usize, 0.0f64); bins];

    for (event, category, record) in combined.iter() {
        let distance = receivers
            .get(event)
            .and_then(|layer| layer.get(category))
            .and_then(|component| component.distances.get(record.channel_id()));
        if let Some(&distance) = distance {
            let index = ((distance / DISTANCE_BIN_DEG) as usize).min(bins - 1);
            sums[index].0 += 1;
            sums[index].1 += record.weight();
        }
    }

    sums.into_iter()
        .enumerate()
        .map(|(i, (channels, sum))| DistanceBin {
            lower: i as f64 * DISTANCE_BIN_DEG,
            upper: (i + 1) as f64 * DISTANCE_BIN_DEG,
            channels,
            mean_weight: if channels > 0 { sum / channels as f64 } else { 0.0 },
        })
        .collect()
}

fn log_report(report: &WeightReport) {
    let overall = &report.overall;
    tracing::info!(
        events = overall.events,
        receivers = overall.receivers,
        windows = overall.windows,
        min_weight = overall.min_weight,
        max_weight = overall.max_weight,
        cond_num = overall.cond_num,
        weighted_sum = overall.weighted_sum,
        "Weight summary"
    );
    for (category, summary) in &report.categories {
        tracing::info!(
            category = %category,
            channels = summary.channels,
            windows = summary.windows,
            min_weight = summary.min_weight,
            max_weight = summary.max_weight,
            cond_num = summary.cond_num,
            unconverged = summary.unconverged,
            "Category summary"
        );
    }
    if let Some(layer) = &report.source_layer {
        tracing::info!(min = layer.min, max = layer.max, cond_num = layer.cond_num, "Source layer");
    }
    if let Some(layer) = &report.category_layer {
        tracing::info!(
            min = layer.min,
            max = layer.max,
            cond_num = layer.cond_num,
            "Category layer"
        );
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}
