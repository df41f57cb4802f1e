//! Path descriptor and the station, window and source files it points to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use common::parallel::{try_par_map_keyed, DEFAULT_MAX_CONCURRENT};
use serde::{Deserialize, Serialize};
use weights::{EventInput, GeoCoord};

use crate::cmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathDescriptor {
    pub input: BTreeMap<String, EventPaths>,
    /// Prefix of the log files.
    pub logfile: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmtfile: Option<PathBuf>,
    pub station_file: PathBuf,
    pub period_info: BTreeMap<String, BandPaths>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPaths {
    pub window_file: PathBuf,
    pub output_file: PathBuf,
}

impl PathDescriptor {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let descriptor: Self = common::serde::load_file(path)?;
        if descriptor.input.is_empty() {
            bail!("Path file {} lists no events", path.display());
        }
        Ok(descriptor)
    }

    /// Every file the run reads.
    pub fn input_files(&self) -> Vec<&Path> {
        let mut files = Vec::new();
        for event in self.input.values() {
            files.push(event.station_file.as_path());
            files.extend(event.cmtfile.as_deref());
            files.extend(event.period_info.values().map(|band| band.window_file.as_path()));
        }
        files
    }

    /// Fails listing every input file that does not exist.
    pub fn check_inputs(&self) -> anyhow::Result<()> {
        let missing = common::file_utils::missing_files(self.input_files());
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            bail!("Missing input files: {}", list.join(", "));
        }
        Ok(())
    }

    /// Loads every event in parallel.
    pub fn load_events(&self) -> anyhow::Result<BTreeMap<String, EventInput>> {
        try_par_map_keyed(&self.input, DEFAULT_MAX_CONCURRENT, |event, paths| {
            paths
                .load()
                .with_context(|| format!("Failed to load inputs of event {event}"))
        })
    }
}

impl EventPaths {
    pub fn location(&self) -> anyhow::Result<GeoCoord> {
        match (&self.source, &self.cmtfile) {
            (Some(source), None) => GeoCoord::new(source.latitude, source.longitude)
                .with_context(|| {
                    format!(
                        "Invalid source location ({}, {})",
                        source.latitude, source.longitude
                    )
                }),
            (None, Some(cmtfile)) => cmt::load_location(cmtfile),
            (Some(_), Some(_)) => bail!("Give either `source` or `cmtfile`, not both"),
            (None, None) => bail!("Event has neither `source` nor `cmtfile`"),
        }
    }

    pub fn load(&self) -> anyhow::Result<EventInput> {
        let mut input =
            EventInput::new(self.location()?).with_stations(load_stations(&self.station_file)?);
        for (band, paths) in &self.period_info {
            input = input.with_band(band.as_str(), load_window_counts(&paths.window_file)?);
        }
        Ok(input)
    }
}

/// Only the horizontal position is used; elevation, burial depth and any other
/// keys of a station entry are ignored.
#[derive(Debug, Deserialize)]
struct StationEntry {
    latitude: f64,
    longitude: f64,
}

/// `{channel_id: {latitude, longitude, ...}}` into coordinates per channel.
pub fn load_stations(path: &Path) -> anyhow::Result<BTreeMap<String, GeoCoord>> {
    let entries: BTreeMap<String, StationEntry> = common::serde::load_file(path)?;
    entries
        .into_iter()
        .map(|(channel_id, entry)| {
            let coord = GeoCoord::new(entry.latitude, entry.longitude).with_context(|| {
                format!(
                    "Channel {channel_id} in {} has invalid coordinates ({}, {})",
                    path.display(),
                    entry.latitude,
                    entry.longitude
                )
            })?;
            Ok((channel_id, coord))
        })
        .collect()
}

/// Window file shape: `{station: {channel_id: [window, ...]}}`.
pub type WindowFile = BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>>;

/// Number of windows per channel id.
pub fn load_window_counts(path: &Path) -> anyhow::Result<BTreeMap<String, usize>> {
    let windows: WindowFile = common::serde::load_file(path)?;
    Ok(window_counts(&windows))
}

pub fn window_counts(windows: &WindowFile) -> BTreeMap<String, usize> {
    windows
        .values()
        .flat_map(|channels| channels.iter())
        .map(|(channel_id, list)| (channel_id.clone(), list.len()))
        .collect()
}
