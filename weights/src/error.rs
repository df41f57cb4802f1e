//! Error types for the weighting engine.

use std::path::PathBuf;

use strum_macros::{Display, EnumString};
use thiserror::Error;

/// The stage of the pipeline that owns a normalization scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Receiver,
    Source,
    Category,
    Ensemble,
}

/// Invalid or inconsistent parameters. Raised before any numeric work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Category ratio keys mismatch: missing {missing:?}, redundant {redundant:?}")]
    RatioKeyMismatch {
        missing: Vec<String>,
        redundant: Vec<String>,
    },

    #[error("Invalid category key '{0}', expected '<band>.<component>'")]
    InvalidCategoryKey(String),

    #[error("Failed to parse YAML parameters")]
    Yaml(#[from] serde_yml::Error),

    #[error("Failed to parse JSON parameters")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read parameters from '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A weighted total failed to reproduce its expected value.
///
/// Always fatal: it means the arithmetic of an upstream stage is wrong.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error(
        "{stage} conservation failed for {scope}: expected {expected:.9e}, got {actual:.9e}"
    )]
    Conservation {
        stage: Stage,
        scope: String,
        expected: f64,
        actual: f64,
    },
}

#[derive(Debug, Error)]
pub enum WeightError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Point '{tag}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinate {
        tag: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("Point '{tag}' has invalid prior weight {weight}")]
    InvalidPrior { tag: String, weight: f64 },

    #[error("Duplicate point tag '{0}'")]
    DuplicateTag(String),

    #[error("No coordinates found for channel '{0}' (tried E, 1 and Z fallbacks)")]
    MissingCoordinates(String),

    #[error("{stage} weighted sum for {scope} is {sum}, cannot normalize")]
    DegenerateSum {
        stage: Stage,
        scope: String,
        sum: f64,
    },

    #[error("{layer} layer has no entry for '{key}'")]
    MissingLayerEntry { layer: Stage, key: String },
}

pub type WeightResult<T> = Result<T, WeightError>;
