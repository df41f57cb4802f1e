//! Multiplies the receiver, source and category layers into final per-channel weights.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::category::{Category, CategoryWeights};
use crate::conservation;
use crate::error::{Stage, WeightError, WeightResult};
use crate::receiver::ReceiverLayer;
use crate::source::{CategorySourceWeights, SourceWeights};

/// Final weight of one channel, with the layer factors it was built from.
///
/// Serializes as `{receiver, source, category, weight}`, the layout of the
/// per-band output files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightRecord {
    #[serde(skip)]
    channel_id: String,
    receiver: f64,
    source: f64,
    category: f64,
    weight: f64,
    #[serde(skip)]
    windows: usize,
}

impl WeightRecord {
    pub fn new(
        channel_id: impl Into<String>,
        receiver: f64,
        source: f64,
        category: f64,
        windows: usize,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            receiver,
            source,
            category,
            weight: receiver * source * category,
            windows,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
    pub fn receiver(&self) -> f64 {
        self.receiver
    }
    pub fn source(&self) -> f64 {
        self.source
    }
    pub fn category(&self) -> f64 {
        self.category
    }
    pub fn weight(&self) -> f64 {
        self.weight
    }
    pub fn windows(&self) -> usize {
        self.windows
    }
}

/// Source layer handed to the combiner.
#[derive(Debug, Clone, Copy)]
pub enum SourceLayer<'a> {
    /// One weight per event, shared by all categories.
    PerEvent(&'a SourceWeights),
    /// One weight per event and category.
    PerCategory(&'a CategorySourceWeights),
}

impl SourceLayer<'_> {
    fn weight(&self, event: &str, category: &Category) -> WeightResult<f64> {
        let found = match self {
            SourceLayer::PerEvent(weights) => weights.weight(event),
            SourceLayer::PerCategory(weights) => weights.weight(category, event),
        };
        found.ok_or_else(|| WeightError::MissingLayerEntry {
            layer: Stage::Source,
            key: match self {
                SourceLayer::PerEvent(_) => event.to_string(),
                SourceLayer::PerCategory(_) => format!("{event}/{category}"),
            },
        })
    }
}

pub type EventRecords = BTreeMap<Category, BTreeMap<String, WeightRecord>>;

/// Combined weights grouped `event -> category -> channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedWeights {
    records: BTreeMap<String, EventRecords>,
    expected_total: f64,
    weighted_total: f64,
}

impl CombinedWeights {
    pub fn events(&self) -> impl Iterator<Item = (&str, &EventRecords)> {
        self.records.iter().map(|(event, records)| (event.as_str(), records))
    }

    pub fn event(&self, event: &str) -> Option<&EventRecords> {
        self.records.get(event)
    }

    pub fn get(&self, event: &str, category: &Category, channel_id: &str) -> Option<&WeightRecord> {
        self.records.get(event)?.get(category)?.get(channel_id)
    }

    /// Every record with its event and category.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Category, &WeightRecord)> {
        self.records.iter().flat_map(|(event, categories)| {
            categories.iter().flat_map(move |(category, channels)| {
                channels
                    .values()
                    .map(move |record| (event.as_str(), category, record))
            })
        })
    }

    /// Records of one event and period band keyed by channel id, the content of one
    /// output file.
    pub fn band_records(&self, event: &str, band: &str) -> BTreeMap<&str, &WeightRecord> {
        self.records
            .get(event)
            .into_iter()
            .flat_map(|categories| categories.iter())
            .filter(|(category, _)| category.band() == band)
            .flat_map(|(_, channels)| channels.iter().map(|(id, r)| (id.as_str(), r)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn expected_total(&self) -> f64 {
        self.expected_total
    }

    /// `Σ weight × windows` over every record.
    pub fn weighted_total(&self) -> f64 {
        self.weighted_total
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WeightCombiner;

impl WeightCombiner {
    /// Multiplies the layers and checks the weighted total end to end.
    ///
    /// The expected total is the category layer's target when it is present,
    /// otherwise `Σ source × windows` over every event and category.
    pub fn combine(
        &self,
        receivers: &BTreeMap<String, ReceiverLayer>,
        source: Option<SourceLayer<'_>>,
        categories: Option<&CategoryWeights>,
    ) -> WeightResult<CombinedWeights> {
        let mut records: BTreeMap<String, EventRecords> = BTreeMap::new();
        let mut source_total = 0.0;

        for (event, layer) in receivers {
            let mut event_records = EventRecords::new();
            for (category, component) in layer {
                let source_weight = match &source {
                    Some(source) => source.weight(event, category)?,
                    None => 1.0,
                };
                let category_weight = match categories {
                    Some(categories) => {
                        categories
                            .get(category)
                            .ok_or_else(|| WeightError::MissingLayerEntry {
                                layer: Stage::Category,
                                key: category.to_string(),
                            })?
                    }
                    None => 1.0,
                };
                source_total += source_weight * component.total_windows as f64;

                let channels = component
                    .weights
                    .iter()
                    .map(|(channel_id, receiver_weight)| {
                        let windows = component
                            .window_counts
                            .get(channel_id)
                            .copied()
                            .ok_or_else(|| WeightError::MissingLayerEntry {
                                layer: Stage::Receiver,
                                key: channel_id.clone(),
                            })?;
                        let record = WeightRecord::new(
                            channel_id.as_str(),
                            *receiver_weight,
                            source_weight,
                            category_weight,
                            windows,
                        );
                        Ok((channel_id.clone(), record))
                    })
                    .collect::<WeightResult<BTreeMap<_, _>>>()?;
                event_records.insert(category.clone(), channels);
            }
            records.insert(event.clone(), event_records);
        }

        let expected_total = categories.map_or(source_total, |c| c.target);
        let weighted_total = conservation::weighted_sum(
            records
                .values()
                .flat_map(|categories| categories.values())
                .flat_map(|channels| channels.values())
                .map(|record| (record.weight, record.windows as f64)),
        );
        conservation::check(Stage::Ensemble, "ensemble", expected_total, weighted_total)?;

        tracing::info!(
            events = records.len(),
            expected_total,
            weighted_total,
            "Weights combined"
        );

        Ok(CombinedWeights {
            records,
            expected_total,
            weighted_total,
        })
    }
}
