use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of scan steps needed to sweep the whole sphere with the default start and gap.
pub const DEFAULT_MAX_STEPS: usize = 360;

/// Parameters of the reference-distance scan.
///
/// Distances are in degrees of arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclusteringParams {
    /// Target condition number as a fraction of the peak condition number seen during the scan.
    pub max_ratio: f64,
    /// First trial reference distance.
    pub start: f64,
    /// Increment between trial reference distances.
    pub gap: f64,
    /// The peak counts as established once the condition number falls below
    /// `drop_ratio * peak`. From then on, if `max_ratio * peak <= 1` the target can no longer be
    /// met (the condition number only approaches 1) and the scan stops. `None` scans all steps.
    pub drop_ratio: Option<f64>,
    /// Hard bound on the number of trial distances.
    pub max_steps: usize,
    /// Keep the scan curve for external plotting.
    pub plot: bool,
}

impl Default for DeclusteringParams {
    fn default() -> Self {
        Self {
            max_ratio: 0.35,
            start: 0.5,
            gap: 0.5,
            drop_ratio: Some(0.95),
            max_steps: DEFAULT_MAX_STEPS,
            plot: false,
        }
    }
}

impl DeclusteringParams {
    pub fn with_max_ratio(max_ratio: f64) -> Self {
        Self {
            max_ratio,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_ratio > 0.0 && self.max_ratio <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "search_ratio",
                reason: format!("must be in (0, 1], got {}", self.max_ratio),
            });
        }
        if !(self.start.is_finite() && self.start > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "start",
                reason: format!("must be a positive distance, got {}", self.start),
            });
        }
        if !(self.gap.is_finite() && self.gap > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "gap",
                reason: format!("must be a positive distance, got {}", self.gap),
            });
        }
        if let Some(drop_ratio) = self.drop_ratio {
            if !(drop_ratio > 0.0 && drop_ratio < 1.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "drop_ratio",
                    reason: format!("must be in (0, 1), got {}", drop_ratio),
                });
            }
        }
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Trial reference distance of scan step `step`.
    pub fn ref_distance(&self, step: usize) -> f64 {
        self.start + self.gap * step as f64
    }
}
