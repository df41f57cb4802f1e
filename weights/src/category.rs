//! Category-level balancing.
//!
//! A category is a `(period band, component)` bucket. Categories contribute very
//! different numbers of windows; this layer rescales them so that each carries
//! either the same share of the total or a user-chosen share.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::conservation;
use crate::error::{ConfigError, Stage, WeightError, WeightResult};

/// Last dot-separated segment of a channel id: `II.AAK.00.BHZ` -> `BHZ`.
pub fn component_of(channel_id: &str) -> &str {
    channel_id.rsplit('.').next().unwrap_or(channel_id)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category {
    band: String,
    component: String,
}

impl Category {
    pub fn new(band: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            band: band.into(),
            component: component.into(),
        }
    }

    /// Category of `channel_id` within period band `band`.
    pub fn of_channel(band: &str, channel_id: &str) -> Self {
        Self::new(band, component_of(channel_id))
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn component(&self) -> &str {
        &self.component
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.band, self.component)
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((band, component)) if !band.is_empty() && !component.is_empty() => {
                Ok(Self::new(band, component))
            }
            _ => Err(ConfigError::InvalidCategoryKey(s.to_string())),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryPolicy {
    /// Every non-empty category gets the same share of the total.
    Equal,
    /// Category `c` gets a weight proportional to `1 / ratios[c]`, scaled so the
    /// weighted total equals `total` (default: the raw total).
    UserRatio {
        ratios: BTreeMap<Category, f64>,
        total: Option<f64>,
    },
}

/// Output of [`CategoryWeighter::weigh`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryWeights {
    pub weights: BTreeMap<Category, f64>,
    /// Effective window counts the weights were computed on.
    pub counts: BTreeMap<Category, f64>,
    /// `Σ weight × count` the weights reproduce.
    pub target: f64,
    /// Each weight divided by the smallest weight.
    pub ratio_to_min: BTreeMap<Category, f64>,
}

impl CategoryWeights {
    pub fn get(&self, category: &Category) -> Option<f64> {
        self.weights.get(category).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn empty(counts: BTreeMap<Category, f64>) -> Self {
        Self {
            weights: BTreeMap::new(),
            counts,
            target: 0.0,
            ratio_to_min: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryWeighter {
    policy: CategoryPolicy,
}

impl CategoryWeighter {
    pub fn new(policy: CategoryPolicy) -> Result<Self, ConfigError> {
        if let CategoryPolicy::UserRatio { ratios, total } = &policy {
            let invalid = ratios.iter().find(|(_, r)| !(r.is_finite() && **r > 0.0));
            if let Some((category, ratio)) = invalid {
                return Err(ConfigError::InvalidParameter {
                    name: "ratio",
                    reason: format!("ratio of {category} must be positive, got {ratio}"),
                });
            }
            if let Some(total) = total {
                if !(total.is_finite() && *total > 0.0) {
                    return Err(ConfigError::InvalidParameter {
                        name: "total",
                        reason: format!("must be positive, got {total}"),
                    });
                }
            }
        }
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &CategoryPolicy {
        &self.policy
    }

    /// Computes one weight per non-empty category of `counts`.
    pub fn weigh(&self, counts: &BTreeMap<Category, f64>) -> WeightResult<CategoryWeights> {
        let invalid = counts.iter().find(|(_, c)| !(c.is_finite() && **c >= 0.0));
        if let Some((category, count)) = invalid {
            return Err(WeightError::DegenerateSum {
                stage: Stage::Category,
                scope: category.to_string(),
                sum: *count,
            });
        }

        let active: Vec<(&Category, f64)> = counts
            .iter()
            .filter(|(_, c)| **c > 0.0)
            .map(|(k, c)| (k, *c))
            .collect();

        let (weights, target) = match &self.policy {
            CategoryPolicy::Equal => {
                if active.is_empty() {
                    return Ok(CategoryWeights::empty(counts.clone()));
                }
                let share = 1.0 / active.len() as f64;
                let weights: BTreeMap<Category, f64> = active
                    .iter()
                    .map(|(category, count)| ((*category).clone(), share / count))
                    .collect();
                (weights, 1.0)
            }
            CategoryPolicy::UserRatio { ratios, total } => {
                check_ratio_keys(ratios, counts)?;
                if active.is_empty() {
                    return Ok(CategoryWeights::empty(counts.clone()));
                }
                let target = total.unwrap_or_else(|| active.iter().map(|(_, c)| c).sum());
                let inverse_sum: f64 = active
                    .iter()
                    .map(|(category, count)| count / ratios[*category])
                    .sum();
                let scale = target / inverse_sum;
                let weights: BTreeMap<Category, f64> = active
                    .iter()
                    .map(|(category, _)| ((*category).clone(), scale / ratios[*category]))
                    .collect();
                (weights, target)
            }
        };

        let actual = conservation::weighted_sum(
            weights.iter().map(|(category, w)| (*w, counts[category])),
        );
        conservation::check(Stage::Category, "all categories", target, actual)?;

        let min = weights.values().copied().fold(f64::INFINITY, f64::min);
        let ratio_to_min = weights
            .iter()
            .map(|(category, w)| (category.clone(), w / min))
            .collect();

        tracing::info!(
            categories = weights.len(),
            target,
            "Category weights computed"
        );

        Ok(CategoryWeights {
            weights,
            counts: counts.clone(),
            target,
            ratio_to_min,
        })
    }
}

fn check_ratio_keys(
    ratios: &BTreeMap<Category, f64>,
    counts: &BTreeMap<Category, f64>,
) -> Result<(), ConfigError> {
    // Empty categories need no ratio, but may carry one.
    let missing: Vec<String> = counts
        .iter()
        .filter(|(k, c)| **c > 0.0 && !ratios.contains_key(*k))
        .map(|(k, _)| k.to_string())
        .collect();
    let redundant: Vec<String> = ratios
        .keys()
        .filter(|k| !counts.contains_key(*k))
        .map(Category::to_string)
        .collect();

    if missing.is_empty() && redundant.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::RatioKeyMismatch { missing, redundant })
    }
}
