//! Weights - hierarchical window weighting for seismic inversion.
//!
//! Measurement windows are unevenly distributed: stations cluster, earthquakes
//! cluster along faults, and some period-band/component categories produce far
//! more windows than others. This library computes per-channel weights that
//! flatten those imbalances while keeping every weighted window total equal to
//! its expected value:
//! - Spatial declustering of points on a sphere
//! - Receiver and source weighting built on it
//! - Category balancing (equal shares or user ratios)
//! - Validated combination and diagnostics
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use weights::{ConfigSource, EventInput, WeightingPipeline};
//!
//! let params = ConfigSource::FilePath("param.yml".into()).resolve()?;
//! let pipeline = WeightingPipeline::new(params)?;
//! let output = pipeline.run(&events)?;
//!
//! println!("Weighted total {}", output.combined.weighted_total());
//! ```

pub mod analysis;
pub mod category;
pub mod combine;
pub mod config;
pub(crate) mod conservation;
pub mod declustering;
pub mod error;
pub mod geo;
pub mod pipeline;
pub mod receiver;
pub mod source;

// ============================================================================
// Errors
// ============================================================================

pub use error::{ConfigError, Stage, ValidationError, WeightError, WeightResult};

// ============================================================================
// Geometry and declustering
// ============================================================================

pub use declustering::{
    Declustering, DeclusteringParams, DeclusteringSolver, ScanStep, DEFAULT_MAX_STEPS,
};
pub use geo::{GeoCoord, GeoPoint};

// ============================================================================
// Weighting layers
// ============================================================================

pub use category::{Category, CategoryPolicy, CategoryWeighter, CategoryWeights};
pub use combine::{CombinedWeights, SourceLayer, WeightCombiner, WeightRecord};
pub use receiver::{ComponentWeights, ReceiverConfig, ReceiverLayer, ReceiverWeighter};
pub use source::{
    CategorySourceWeights, SourceConfig, SourceNormalization, SourceWeighter, SourceWeights,
};

// ============================================================================
// Configuration, orchestration and diagnostics
// ============================================================================

pub use analysis::{WeightAnalyzer, WeightReport};
pub use config::{ConfigSource, ParamFile, WeightingParams};
pub use pipeline::{EventInput, PipelineMode, PipelineOutput, SourceResult, WeightingPipeline};
