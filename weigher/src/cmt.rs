//! Event location from a CMTSOLUTION file.

use std::path::Path;

use anyhow::Context;
use weights::GeoCoord;

#[derive(Debug, thiserror::Error)]
pub enum CmtError {
    #[error("CMTSOLUTION has no '{0}' line")]
    MissingField(&'static str),
    #[error("Invalid {field} '{value}' in CMTSOLUTION")]
    InvalidValue { field: &'static str, value: String },
}

/// Reads the `latitude:` and `longitude:` lines of a CMTSOLUTION.
pub fn parse_location(text: &str) -> Result<GeoCoord, CmtError> {
    let latitude = field(text, "latitude")?;
    let longitude = field(text, "longitude")?;
    GeoCoord::new(latitude, longitude).ok_or_else(|| CmtError::InvalidValue {
        field: "location",
        value: format!("{latitude}, {longitude}"),
    })
}

pub fn load_location(path: &Path) -> anyhow::Result<GeoCoord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CMTSOLUTION {}", path.display()))?;
    parse_location(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn field(text: &str, name: &'static str) -> Result<f64, CmtError> {
    let raw = text
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .ok_or(CmtError::MissingField(name))?;
    raw.parse().map_err(|_| CmtError::InvalidValue {
        field: name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::FloatExt;

    const CMT: &str = " PDE 2010  1  1  0  0  0.00 -13.8200 166.5400  30.0 6.0 6.0 VANUATU ISLANDS
event name:     201001010000A
time shift:      3.5000
half duration:   2.1000
latitude:      -13.7400
longitude:     166.5200
depth:          25.6000
Mrr:      -1.250000e+25
";

    #[test]
    fn parses_centroid_location() {
        let location = parse_location(CMT).unwrap();
        assert!(location.latitude.approximately_eq(-13.74));
        assert!(location.longitude.approximately_eq(166.52));
    }

    #[test]
    fn missing_longitude() {
        let text = "latitude: 10.0\ndepth: 5.0\n";
        assert!(matches!(
            parse_location(text),
            Err(CmtError::MissingField("longitude"))
        ));
    }

    #[test]
    fn invalid_numbers() {
        assert!(matches!(
            parse_location("latitude: abc\nlongitude: 1.0\n"),
            Err(CmtError::InvalidValue { field: "latitude", .. })
        ));
        assert!(matches!(
            parse_location("latitude: 95.0\nlongitude: 1.0\n"),
            Err(CmtError::InvalidValue { field: "location", .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CMTSOLUTION");
        std::fs::write(&path, CMT).unwrap();
        assert!(load_location(&path).is_ok());
        assert!(load_location(&dir.path().join("missing")).is_err());
    }
}
