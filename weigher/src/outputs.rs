//! Weight files per (event, band) and the run's log files.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use common::serde::dump_file;
use serde::Serialize;
use weights::analysis::{DistanceBin, Histogram};
use weights::{Category, CategoryWeights, PipelineOutput, ScanStep, SourceResult};

use crate::inputs::PathDescriptor;

pub const RECEIVER_LOG: &str = "receiver_weights.json";
pub const SOURCE_LOG: &str = "source_weights.json";
pub const CATEGORY_LOG: &str = "category_weights.json";
pub const SUMMARY_LOG: &str = "weights.summary.json";
pub const HISTOGRAM_LOG: &str = "weights.hist.json";
pub const SCAN_LOG: &str = "scan.json";

/// `<prefix>.<suffix>`, keeping any directory part of the prefix.
pub fn log_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[derive(Serialize)]
struct ReceiverEntry<'a> {
    ref_distance: Option<f64>,
    cond_num: f64,
    converged: bool,
    min_weight: f64,
    max_weight: f64,
    total_windows: usize,
    weights: &'a BTreeMap<String, f64>,
}

#[derive(Serialize)]
struct SourceEntry<'a> {
    normalization: &'static str,
    ref_distance: Option<f64>,
    cond_num: f64,
    converged: bool,
    weights: &'a BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    per_category: Option<&'a BTreeMap<Category, BTreeMap<String, f64>>>,
}

#[derive(Serialize)]
struct CategoryEntry<'a> {
    counts: &'a BTreeMap<Category, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weights: Option<&'a CategoryWeights>,
}

#[derive(Serialize)]
struct HistogramEntry<'a> {
    weights: &'a Histogram,
    windows: &'a Histogram,
    distance_profile: &'a [DistanceBin],
}

#[derive(Serialize)]
struct ScanEntry<'a> {
    receiver: BTreeMap<&'a str, BTreeMap<&'a Category, &'a [ScanStep]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a [ScanStep]>,
}

/// Writes every `output_file` of the descriptor. Returns the number of files written.
pub fn write_weights(
    descriptor: &PathDescriptor,
    output: &PipelineOutput,
) -> anyhow::Result<usize> {
    let mut written = 0;
    for (event, paths) in &descriptor.input {
        for (band, band_paths) in &paths.period_info {
            let records = output.combined.band_records(event, band);
            dump_file(&records, &band_paths.output_file).with_context(|| {
                format!("Failed to write weights of event {event} band {band}")
            })?;
            tracing::debug!(
                event = %event,
                band = %band,
                channels = records.len(),
                path = %band_paths.output_file.display(),
                "Weights written"
            );
            written += 1;
        }
    }
    Ok(written)
}

/// Writes the log files next to `prefix`. Histogram and scan files only when `plot` is set.
pub fn write_logs(prefix: &Path, output: &PipelineOutput, plot: bool) -> anyhow::Result<()> {
    let receivers: BTreeMap<&str, BTreeMap<&Category, ReceiverEntry<'_>>> = output
        .receivers
        .iter()
        .map(|(event, layer)| {
            let entries = layer
                .iter()
                .map(|(category, component)| {
                    let entry = ReceiverEntry {
                        ref_distance: component.ref_distance,
                        cond_num: component.cond_num,
                        converged: component.converged,
                        min_weight: component.min_weight(),
                        max_weight: component.max_weight(),
                        total_windows: component.total_windows,
                        weights: &component.weights,
                    };
                    (category, entry)
                })
                .collect();
            (event.as_str(), entries)
        })
        .collect();
    dump_file(&receivers, &log_path(prefix, RECEIVER_LOG))?;

    if let Some(source) = &output.source {
        let base = source.event_weights();
        let entry = SourceEntry {
            normalization: match source {
                SourceResult::PerEvent(_) => "per_event",
                SourceResult::PerCategory(_) => "per_category",
            },
            ref_distance: base.ref_distance,
            cond_num: base.cond_num,
            converged: base.converged,
            weights: &base.weights,
            per_category: match source {
                SourceResult::PerEvent(_) => None,
                SourceResult::PerCategory(weights) => Some(&weights.weights),
            },
        };
        dump_file(&entry, &log_path(prefix, SOURCE_LOG))?;
    }

    let categories = CategoryEntry {
        counts: &output.category_counts,
        weights: output.categories.as_ref(),
    };
    dump_file(&categories, &log_path(prefix, CATEGORY_LOG))?;
    dump_file(&output.report, &log_path(prefix, SUMMARY_LOG))?;

    if plot {
        let histograms = HistogramEntry {
            weights: &output.report.weight_histogram,
            windows: &output.report.window_histogram,
            distance_profile: &output.report.distance_profile,
        };
        dump_file(&histograms, &log_path(prefix, HISTOGRAM_LOG))?;

        let scans = ScanEntry {
            receiver: output
                .receivers
                .iter()
                .map(|(event, layer)| {
                    let steps = layer
                        .iter()
                        .map(|(category, component)| (category, component.scan.as_slice()))
                        .collect();
                    (event.as_str(), steps)
                })
                .collect(),
            source: output
                .source
                .as_ref()
                .map(|source| source.event_weights().scan.as_slice()),
        };
        dump_file(&scans, &log_path(prefix, SCAN_LOG))?;
    }

    tracing::info!(prefix = %prefix.display(), plot, "Log files written");
    Ok(())
}
