//! End-to-end weighting over in-memory inputs.
//!
//! Two modes:
//!
//! * single event without source weighting: `receiver × category`, category
//!   weights computed on raw window counts;
//! * ensemble: `receiver × source × category`, category weights computed on
//!   source-weighted counts `Σ_e w_e n_ec` (or on raw counts when the source
//!   layer is normalized per category).


use std::collections::{BTreeMap, BTreeSet};

use common::parallel::{try_par_map_keyed, DEFAULT_MAX_CONCURRENT};
use strum_macros::{Display, EnumString};

use crate::analysis::{WeightAnalyzer, WeightReport};
use crate::category::{Category, CategoryWeighter, CategoryWeights};
use crate::combine::{CombinedWeights, SourceLayer, WeightCombiner};
use crate::config::WeightingParams;
use crate::error::{ConfigError, WeightError, WeightResult};
use crate::geo::GeoCoord;
use crate::receiver::{ReceiverLayer, ReceiverWeighter};
use crate::source::{
    CategorySourceWeights, SourceConfig, SourceNormalization, SourceWeighter, SourceWeights,
};

/// Everything known about one earthquake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventInput {
    pub source: Option<GeoCoord>,
    pub stations: BTreeMap<String, GeoCoord>,
    /// `band -> channel id -> window count`.
    pub windows: BTreeMap<String, BTreeMap<String, usize>>,
}

impl EventInput {
    pub fn new(source: GeoCoord) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    pub fn with_stations(mut self, stations: BTreeMap<String, GeoCoord>) -> Self {
        self.stations = stations;
        self
    }

    pub fn with_band(mut self, band: impl Into<String>, counts: BTreeMap<String, usize>) -> Self {
        self.windows.insert(band.into(), counts);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineMode {
    SingleEvent,
    Ensemble,
}

/// Source layer as computed by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    PerEvent(SourceWeights),
    PerCategory(CategorySourceWeights),
}

impl SourceResult {
    pub fn as_layer(&self) -> SourceLayer<'_> {
        match self {
            SourceResult::PerEvent(weights) => SourceLayer::PerEvent(weights),
            SourceResult::PerCategory(weights) => SourceLayer::PerCategory(weights),
        }
    }

    /// The event declustering behind either normalization.
    pub fn event_weights(&self) -> &SourceWeights {
        match self {
            SourceResult::PerEvent(weights) => weights,
            SourceResult::PerCategory(weights) => &weights.base,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub mode: PipelineMode,
    pub receivers: BTreeMap<String, ReceiverLayer>,
    pub source: Option<SourceResult>,
    /// Counts the category layer was computed on.
    pub category_counts: BTreeMap<Category, f64>,
    pub categories: Option<CategoryWeights>,
    pub combined: CombinedWeights,
    pub report: WeightReport,
}

#[derive(Debug, Clone)]
pub struct WeightingPipeline {
    receiver: ReceiverWeighter,
    source: Option<SourceWeighter>,
    category: Option<CategoryWeighter>,
}

impl WeightingPipeline {
    pub fn new(params: WeightingParams) -> Result<Self, ConfigError> {
        Ok(Self {
            receiver: ReceiverWeighter::new(params.receiver)?,
            source: params.source.map(SourceWeighter::new).transpose()?,
            category: params.category.map(CategoryWeighter::new).transpose()?,
        })
    }

    pub fn mode(&self, n_events: usize) -> PipelineMode {
        if n_events == 1 && self.source.is_none() {
            PipelineMode::SingleEvent
        } else {
            PipelineMode::Ensemble
        }
    }

    pub fn run(&self, events: &BTreeMap<String, EventInput>) -> WeightResult<PipelineOutput> {
        let mode = self.mode(events.len());
        tracing::info!(%mode, events = events.len(), "Weighting started");

        let centers = event_centers(events)?;
        let receivers = self.weigh_receivers(events, &centers)?;
        let raw_counts = category_counts(&receivers);

        let source = match mode {
            PipelineMode::SingleEvent => None,
            PipelineMode::Ensemble => Some(self.weigh_sources(&centers, &receivers)?),
        };

        let mut category_counts = match &source {
            Some(SourceResult::PerEvent(weights)) => source_weighted_counts(&receivers, weights),
            _ => raw_counts
                .iter()
                .map(|(category, n)| (category.clone(), *n as f64))
                .collect(),
        };
        // Categories whose channels all have zero windows still take part in the
        // ratio key check, with count 0.
        for category in input_categories(events) {
            category_counts.entry(category).or_insert(0.0);
        }

        let categories = self
            .category
            .as_ref()
            .map(|weighter| weighter.weigh(&category_counts))
            .transpose()?;

        let source_layer = source.as_ref().map(SourceResult::as_layer);
        let combined = WeightCombiner.combine(&receivers, source_layer, categories.as_ref())?;
        let report =
            WeightAnalyzer.analyze(&combined, &receivers, source_layer, categories.as_ref());

        Ok(PipelineOutput {
            mode,
            receivers,
            source,
            category_counts,
            categories,
            combined,
            report,
        })
    }

    fn weigh_receivers(
        &self,
        events: &BTreeMap<String, EventInput>,
        centers: &BTreeMap<String, GeoCoord>,
    ) -> WeightResult<BTreeMap<String, ReceiverLayer>> {
        try_par_map_keyed(events, DEFAULT_MAX_CONCURRENT, |event, input| {
            let center = centers[event];
            let mut layer = ReceiverLayer::new();
            for (band, counts) in &input.windows {
                layer.extend(self.receiver.weigh(band, center, &input.stations, counts)?);
            }
            tracing::info!(event = %event, categories = layer.len(), "Receiver weights done");
            Ok(layer)
        })
    }

    fn weigh_sources(
        &self,
        centers: &BTreeMap<String, GeoCoord>,
        receivers: &BTreeMap<String, ReceiverLayer>,
    ) -> WeightResult<SourceResult> {
        let uniform;
        let weighter = match &self.source {
            Some(weighter) => weighter,
            None => {
                uniform = SourceWeighter::new(SourceConfig {
                    flag: false,
                    ..Default::default()
                })?;
                &uniform
            }
        };

        match weighter.normalization() {
            SourceNormalization::PerEvent => {
                Ok(SourceResult::PerEvent(weighter.weigh_events(centers)?))
            }
            SourceNormalization::PerCategory => {
                let counts = receivers
                    .iter()
                    .map(|(event, layer)| {
                        let per_category = layer
                            .iter()
                            .map(|(category, c)| (category.clone(), c.total_windows))
                            .collect();
                        (event.clone(), per_category)
                    })
                    .collect();
                Ok(SourceResult::PerCategory(
                    weighter.weigh_by_category(centers, &counts)?,
                ))
            }
        }
    }
}

fn event_centers(
    events: &BTreeMap<String, EventInput>,
) -> WeightResult<BTreeMap<String, GeoCoord>> {
    events
        .iter()
        .map(|(event, input)| {
            input
                .source
                .map(|center| (event.clone(), center))
                .ok_or_else(|| WeightError::MissingCoordinates(event.clone()))
        })
        .collect()
}

/// Every category named by the window counts of `events`, empty ones included.
pub fn input_categories(events: &BTreeMap<String, EventInput>) -> BTreeSet<Category> {
    events
        .values()
        .flat_map(|input| input.windows.iter())
        .flat_map(|(band, counts)| {
            counts
                .keys()
                .map(move |channel_id| Category::of_channel(band, channel_id))
        })
        .collect()
}

/// Raw window total per category over all events.
pub fn category_counts(receivers: &BTreeMap<String, ReceiverLayer>) -> BTreeMap<Category, usize> {
    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    for layer in receivers.values() {
        for (category, component) in layer {
            *counts.entry(category.clone()).or_default() += component.total_windows;
        }
    }
    counts
}

/// `Σ_e w_e n_ec` per category.
pub fn source_weighted_counts(
    receivers: &BTreeMap<String, ReceiverLayer>,
    source: &SourceWeights,
) -> BTreeMap<Category, f64> {
    let mut counts: BTreeMap<Category, f64> = BTreeMap::new();
    for (event, layer) in receivers {
        let weight = source.weight(event).unwrap_or(0.0);
        for (category, component) in layer {
            *counts.entry(category.clone()).or_default() += weight * component.total_windows as f64;
        }
    }
    counts
}
