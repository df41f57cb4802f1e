//! The `count` command: window totals per category over many window files,
//! optionally turned into a default parameter file with balancing ratios.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use common::parallel::{try_par_map_keyed, DEFAULT_MAX_CONCURRENT};
use serde::{Deserialize, Serialize};
use weights::category::component_of;
use weights::config::{CategorySection, LayerSection};
use weights::{Category, CategoryPolicy, CategoryWeighter, ParamFile};

use crate::inputs::load_window_counts;

/// `{input: {event: {band: window_file}}, output_file, weight_output_file?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountDescriptor {
    pub input: BTreeMap<String, BTreeMap<String, PathBuf>>,
    pub output_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_output_file: Option<PathBuf>,
}

/// `user_weight_ratio: {band: {component: emphasis}}`. A larger emphasis gives the
/// category a larger share; absent entries count as 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEmphasis {
    #[serde(default)]
    pub user_weight_ratio: BTreeMap<String, BTreeMap<String, f64>>,
}

impl UserEmphasis {
    fn get(&self, category: &Category) -> f64 {
        self.user_weight_ratio
            .get(category.band())
            .and_then(|components| components.get(category.component()))
            .copied()
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BandCount {
    #[serde(flatten)]
    pub components: BTreeMap<String, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventCount {
    #[serde(flatten)]
    pub bands: BTreeMap<String, BandCount>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowSummary {
    pub detailed_information: BTreeMap<String, EventCount>,
    /// `band -> component -> windows` over every event.
    pub summary: BTreeMap<String, BTreeMap<String, usize>>,
}

impl WindowSummary {
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        self.summary
            .iter()
            .flat_map(|(band, components)| {
                components
                    .iter()
                    .map(move |(component, n)| (Category::new(band, component), *n))
            })
            .collect()
    }
}

/// Windows per component of one window file.
pub fn count_band(channel_counts: &BTreeMap<String, usize>) -> BandCount {
    let mut band = BandCount::default();
    for (channel_id, n) in channel_counts {
        *band
            .components
            .entry(component_of(channel_id).to_string())
            .or_default() += n;
        band.total += n;
    }
    band
}

pub fn count_windows(descriptor: &CountDescriptor) -> anyhow::Result<WindowSummary> {
    let detailed = try_par_map_keyed(&descriptor.input, DEFAULT_MAX_CONCURRENT, |event, bands| {
        let mut count = EventCount::default();
        for (band, window_file) in bands {
            let channels = load_window_counts(window_file)
                .with_context(|| format!("Failed to count windows of event {event} band {band}"))?;
            let band_count = count_band(&channels);
            tracing::debug!(
                event = %event,
                band = %band,
                windows = band_count.total,
                "Window file counted"
            );
            count.total += band_count.total;
            count.bands.insert(band.clone(), band_count);
        }
        Ok::<_, anyhow::Error>(count)
    })?;

    let mut summary: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for event in detailed.values() {
        for (band, band_count) in &event.bands {
            let entry = summary.entry(band.clone()).or_default();
            for (component, n) in &band_count.components {
                *entry.entry(component.clone()).or_default() += n;
            }
        }
    }

    Ok(WindowSummary {
        detailed_information: detailed,
        summary,
    })
}

/// Ratios that balance `counts` under the inverse-ratio category policy, divided by
/// the user emphasis. Empty categories get no entry.
pub fn balancing_ratios(
    counts: &BTreeMap<Category, usize>,
    emphasis: &UserEmphasis,
) -> anyhow::Result<BTreeMap<Category, f64>> {
    let max = counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        bail!("No windows counted, cannot derive category ratios");
    }

    let mut ratios = BTreeMap::new();
    for (category, &n) in counts {
        if n == 0 {
            tracing::warn!(
                category = %category,
                "Category has no windows, left out of the ratio table"
            );
            continue;
        }
        let user = emphasis.get(category);
        if !(user.is_finite() && user > 0.0) {
            bail!("User weight ratio of {category} must be positive, got {user}");
        }
        ratios.insert(category.clone(), n as f64 / max as f64 / user);
    }
    Ok(ratios)
}

/// A parameter file with default receiver settings and the given category ratios.
pub fn default_param_file(ratios: &BTreeMap<Category, f64>) -> ParamFile {
    ParamFile {
        receiver_weighting: LayerSection::default(),
        source_weighting: None,
        category_weighting: CategorySection {
            flag: true,
            ratio: Some(CategorySection::nest_ratios(ratios)),
            total: None,
        },
    }
}

pub fn run(path_file: &Path, param_file: Option<&Path>) -> anyhow::Result<WindowSummary> {
    let descriptor: CountDescriptor = common::serde::load_file(path_file)?;
    let emphasis: UserEmphasis = match param_file {
        Some(path) => common::serde::load_file(path)?,
        None => UserEmphasis::default(),
    };

    let summary = count_windows(&descriptor)?;
    common::serde::dump_file(&summary, &descriptor.output_file)?;
    tracing::info!(
        events = summary.detailed_information.len(),
        output = %descriptor.output_file.display(),
        "Window counts written"
    );

    if let Some(weight_output_file) = &descriptor.weight_output_file {
        let counts = summary.category_counts();
        let ratios = balancing_ratios(&counts, &emphasis)?;

        let active: BTreeMap<Category, f64> = counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(category, n)| (category.clone(), *n as f64))
            .collect();
        let check = CategoryWeighter::new(CategoryPolicy::UserRatio {
            ratios: ratios.clone(),
            total: None,
        })?
        .weigh(&active)?;
        tracing::info!(
            ratio_to_min = ?check.ratio_to_min,
            "Category weights under the generated ratios"
        );

        common::serde::dump_file(&default_param_file(&ratios), weight_output_file)?;
        tracing::info!(output = %weight_output_file.display(), "Default parameter file written");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FloatExt;
    use serde_json::json;
    use weights::ConfigSource;

    fn cat(key: &str) -> Category {
        key.parse().unwrap()
    }

    fn write_windows(path: &Path, value: serde_json::Value) -> PathBuf {
        std::fs::write(path, value.to_string()).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn band_counts_group_by_component() {
        let channels: BTreeMap<String, usize> = [
            ("II.A.00.BHZ".to_string(), 3),
            ("II.B.00.BHZ".to_string(), 2),
            ("II.A.00.BHT".to_string(), 1),
            ("II.C.00.BHR".to_string(), 0),
        ]
        .into_iter()
        .collect();
        let band = count_band(&channels);
        assert_eq!(band.components["BHZ"], 5);
        assert_eq!(band.components["BHT"], 1);
        assert_eq!(band.components["BHR"], 0);
        assert_eq!(band.total, 6);
    }

    #[test]
    fn ratios_balance_counts() {
        let counts: BTreeMap<Category, usize> = [
            (cat("17_40.BHZ"), 100),
            (cat("17_40.BHT"), 50),
            (cat("40_100.BHZ"), 25),
            (cat("40_100.BHT"), 0),
        ]
        .into_iter()
        .collect();
        let ratios = balancing_ratios(&counts, &UserEmphasis::default()).unwrap();

        assert_eq!(ratios.len(), 3);
        assert!(ratios[&cat("17_40.BHZ")].approximately_eq(1.0));
        assert!(ratios[&cat("40_100.BHZ")].approximately_eq(0.25));

        let active = counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(c, n)| (c.clone(), *n as f64))
            .collect();
        let weights = CategoryWeighter::new(CategoryPolicy::UserRatio { ratios, total: None })
            .unwrap()
            .weigh(&active)
            .unwrap();
        let shares: Vec<f64> = weights
            .weights
            .iter()
            .map(|(c, w)| w * weights.counts[c])
            .collect();
        assert!(shares.iter().all(|s| s.relative_eq(shares[0], 1e-12)));
    }

    #[test]
    fn user_emphasis_scales_shares() {
        let counts: BTreeMap<Category, usize> =
            [(cat("17_40.BHZ"), 10), (cat("17_40.BHT"), 10)].into_iter().collect();
        let emphasis = UserEmphasis {
            user_weight_ratio: [(
                "17_40".to_string(),
                [("BHT".to_string(), 2.0)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        };
        let ratios = balancing_ratios(&counts, &emphasis).unwrap();
        assert!(ratios[&cat("17_40.BHZ")].approximately_eq(1.0));
        assert!(ratios[&cat("17_40.BHT")].approximately_eq(0.5));

        let bad = UserEmphasis {
            user_weight_ratio: [(
                "17_40".to_string(),
                [("BHZ".to_string(), 0.0)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        };
        assert!(balancing_ratios(&counts, &bad).is_err());
    }

    #[test]
    fn empty_counts_are_rejected() {
        let counts: BTreeMap<Category, usize> = [(cat("17_40.BHZ"), 0)].into_iter().collect();
        assert!(balancing_ratios(&counts, &UserEmphasis::default()).is_err());
    }

    #[test]
    fn count_run_writes_summary_and_param_file() {
        let dir = tempfile::tempdir().unwrap();
        let ev1 = write_windows(
            &dir.path().join("ev1.json"),
            json!({"II.A": {"II.A.00.BHZ": [{}, {}, {}], "II.A.00.BHT": [{}]}}),
        );
        let ev2 = write_windows(
            &dir.path().join("ev2.json"),
            json!({"II.B": {"II.B.00.BHZ": [{}], "II.B.00.BHT": [{}, {}]}}),
        );
        let path_file = dir.path().join("count.json");
        std::fs::write(
            &path_file,
            json!({
                "input": {"ev1": {"17_40": ev1}, "ev2": {"17_40": ev2}},
                "output_file": dir.path().join("out/counts.json"),
                "weight_output_file": dir.path().join("out/param.yml")
            })
            .to_string(),
        )
        .unwrap();

        let summary = run(&path_file, None).unwrap();
        assert_eq!(summary.summary["17_40"]["BHZ"], 4);
        assert_eq!(summary.summary["17_40"]["BHT"], 3);
        assert_eq!(summary.detailed_information["ev1"].total, 4);

        let text = std::fs::read_to_string(dir.path().join("out/counts.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["detailed_information"]["ev2"]["17_40"]["total"], 3);
        assert_eq!(json["detailed_information"]["ev2"]["17_40"]["BHT"], 2);

        let params = ConfigSource::FilePath(dir.path().join("out/param.yml"))
            .resolve()
            .unwrap();
        match params.category {
            Some(CategoryPolicy::UserRatio { ratios, .. }) => {
                assert!(ratios[&cat("17_40.BHZ")].approximately_eq(1.0));
                assert!(ratios[&cat("17_40.BHT")].approximately_eq(0.75));
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }
}
