use common::{FloatExt, REL_TOLERANCE};

use crate::error::{Stage, ValidationError};

/// Checks that a weighted total reproduces its expected value within [`REL_TOLERANCE`].
pub fn check(
    stage: Stage,
    scope: impl Into<String>,
    expected: f64,
    actual: f64,
) -> Result<(), ValidationError> {
    if actual.is_finite() && actual.relative_eq(expected, REL_TOLERANCE) {
        return Ok(());
    }
    Err(ValidationError::Conservation {
        stage,
        scope: scope.into(),
        expected,
        actual,
    })
}

/// `Σ weight × count`.
pub fn weighted_sum(pairs: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    pairs.into_iter().map(|(weight, count)| weight * count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_tolerance() {
        assert!(check(Stage::Receiver, "17_40.BHZ", 100.0, 100.0 + 1e-5).is_ok());
        assert!(check(Stage::Category, "all", 1.0, 1.0).is_ok());
    }

    #[test]
    fn test_violation_reports_values() {
        let err = check(Stage::Source, "17_40.BHZ", 10.0, 9.0).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Conservation {
                stage: Stage::Source,
                scope: "17_40.BHZ".to_string(),
                expected: 10.0,
                actual: 9.0,
            }
        );
    }

    #[test]
    fn test_nan_never_passes() {
        assert!(check(Stage::Ensemble, "ensemble", 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_weighted_sum() {
        let sum = weighted_sum([(2.0, 3.0), (0.5, 4.0)]);
        assert!(sum.approximately_eq(8.0));
    }
}
