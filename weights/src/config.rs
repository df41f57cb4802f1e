//! Parameter descriptor: raw serde layout and its validated form.
//!
//! ```yaml
//! receiver_weighting:
//!   flag: true
//!   search_ratio: 0.35
//!   plot: false
//! source_weighting:        # optional
//!   flag: true
//!   search_ratio: 0.35
//!   plot: false
//! category_weighting:
//!   flag: true
//!   ratio:                 # optional, band -> component -> ratio
//!     "17_40": {BHZ: 1.0, BHR: 1.0, BHT: 2.0}
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use common::SerdeFormat;
use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryPolicy};
use crate::declustering::{DeclusteringParams, DEFAULT_MAX_STEPS};
use crate::error::ConfigError;
use crate::receiver::ReceiverConfig;
use crate::source::{SourceConfig, SourceNormalization};

fn default_search_ratio() -> f64 {
    DeclusteringParams::default().max_ratio
}

fn default_drop_ratio() -> Option<f64> {
    DeclusteringParams::default().drop_ratio
}

fn default_true() -> bool {
    true
}

/// One declustering layer (`receiver_weighting` or `source_weighting`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSection {
    pub flag: bool,
    #[serde(default = "default_search_ratio")]
    pub search_ratio: f64,
    #[serde(default)]
    pub plot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
    /// `null` disables early termination.
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    /// Only meaningful for `source_weighting`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<SourceNormalization>,
}

impl Default for LayerSection {
    fn default() -> Self {
        Self {
            flag: true,
            search_ratio: default_search_ratio(),
            plot: false,
            start: None,
            gap: None,
            drop_ratio: default_drop_ratio(),
            max_steps: None,
            normalization: None,
        }
    }
}

impl LayerSection {
    pub fn to_params(&self) -> Result<DeclusteringParams, ConfigError> {
        let defaults = DeclusteringParams::default();
        let params = DeclusteringParams {
            max_ratio: self.search_ratio,
            start: self.start.unwrap_or(defaults.start),
            gap: self.gap.unwrap_or(defaults.gap),
            drop_ratio: self.drop_ratio,
            max_steps: self.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            plot: self.plot,
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySection {
    #[serde(default = "default_true")]
    pub flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<BTreeMap<String, BTreeMap<String, f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl Default for CategorySection {
    fn default() -> Self {
        Self {
            flag: true,
            ratio: None,
            total: None,
        }
    }
}

impl CategorySection {
    /// `None` when category weighting is switched off.
    pub fn to_policy(&self) -> Result<Option<CategoryPolicy>, ConfigError> {
        if !self.flag {
            return Ok(None);
        }
        let Some(nested) = &self.ratio else {
            if self.total.is_some() {
                return Err(ConfigError::InvalidParameter {
                    name: "total",
                    reason: "only applies together with `ratio`".to_string(),
                });
            }
            return Ok(Some(CategoryPolicy::Equal));
        };

        let ratios = nested
            .iter()
            .flat_map(|(band, components)| {
                components
                    .iter()
                    .map(move |(component, ratio)| (Category::new(band, component), *ratio))
            })
            .collect();
        Ok(Some(CategoryPolicy::UserRatio {
            ratios,
            total: self.total,
        }))
    }

    /// Nested `band -> component -> ratio` table from flat category ratios.
    pub fn nest_ratios(
        ratios: &BTreeMap<Category, f64>,
    ) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut nested: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for (category, ratio) in ratios {
            nested
                .entry(category.band().to_string())
                .or_default()
                .insert(category.component().to_string(), *ratio);
        }
        nested
    }
}

/// The parameter file as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamFile {
    pub receiver_weighting: LayerSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_weighting: Option<LayerSection>,
    #[serde(default)]
    pub category_weighting: CategorySection,
}

/// Validated parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightingParams {
    pub receiver: ReceiverConfig,
    /// Present when the parameter file has a `source_weighting` section.
    pub source: Option<SourceConfig>,
    /// `None` when category weighting is disabled.
    pub category: Option<CategoryPolicy>,
}

impl WeightingParams {
    /// True when any layer asked for plot data.
    pub fn plot(&self) -> bool {
        self.receiver.params.plot || self.source.as_ref().is_some_and(|s| s.params.plot)
    }
}

impl TryFrom<ParamFile> for WeightingParams {
    type Error = ConfigError;

    fn try_from(file: ParamFile) -> Result<Self, Self::Error> {
        if file.receiver_weighting.normalization.is_some() {
            return Err(ConfigError::InvalidParameter {
                name: "normalization",
                reason: "only applies to `source_weighting`".to_string(),
            });
        }
        let receiver = ReceiverConfig {
            flag: file.receiver_weighting.flag,
            params: file.receiver_weighting.to_params()?,
        };
        let source = file
            .source_weighting
            .as_ref()
            .map(|section| {
                Ok::<_, ConfigError>(SourceConfig {
                    flag: section.flag,
                    params: section.to_params()?,
                    normalization: section.normalization.unwrap_or_default(),
                })
            })
            .transpose()?;
        let category = file.category_weighting.to_policy()?;

        Ok(Self {
            receiver,
            source,
            category,
        })
    }
}

/// Where the parameters come from, resolved once at the boundary.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Inline(serde_yml::Value),
    FilePath(PathBuf),
}

impl ConfigSource {
    pub fn resolve(&self) -> Result<WeightingParams, ConfigError> {
        let file: ParamFile = match self {
            ConfigSource::Inline(value) => serde_yml::from_value(value.clone())?,
            ConfigSource::FilePath(path) => read_param_file(path)?,
        };
        let params = WeightingParams::try_from(file)?;
        tracing::debug!(?params, "Parameters resolved");
        Ok(params)
    }
}

fn read_param_file(path: &Path) -> Result<ParamFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match SerdeFormat::from_file_name(path).unwrap_or(SerdeFormat::Yaml) {
        SerdeFormat::Json => Ok(serde_json::from_str(&text)?),
        SerdeFormat::Yaml => Ok(serde_yml::from_str(&text)?),
    }
}
