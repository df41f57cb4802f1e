pub mod file_format;
pub mod file_utils;
pub mod float_ext;
pub mod log_setup;
pub mod parallel;
pub mod serde;

pub use file_format::{FileExtensionError, SerdeFormat};
pub use float_ext::FloatExt;

pub const EPSILON: f64 = 1e-12;

/// Relative tolerance used for every conservation check.
pub const REL_TOLERANCE: f64 = 1e-6;
