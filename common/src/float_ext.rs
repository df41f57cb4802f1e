pub trait FloatExt {
    fn approximately_eq(self, other: Self) -> bool;

    /// `|a - b| <= rel_tol * max(|a|, |b|)`, with an absolute floor of `crate::EPSILON`
    /// so that values near zero still compare equal.
    fn relative_eq(self, other: Self, rel_tol: Self) -> bool;
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON
    }

    fn relative_eq(self, other: Self, rel_tol: Self) -> bool {
        if self == other {
            return true;
        }
        let diff = (self - other).abs();
        let scale = self.abs().max(other.abs());
        diff <= (rel_tol * scale).max(crate::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_approximately_eq() {
        assert!(1.0_f64.approximately_eq(1.0));
        assert!(0.0_f64.approximately_eq(0.0));
        assert!((0.1_f64 + 0.2_f64).approximately_eq(0.3));
        assert!(!1.0_f64.approximately_eq(1.0001));
    }

    #[test]
    fn f64_relative_eq_scales_with_magnitude() {
        assert!(1.0e6_f64.relative_eq(1.0e6 + 0.5, 1e-6));
        assert!(!1.0e6_f64.relative_eq(1.0e6 + 5.0, 1e-6));
        assert!(1.0_f64.relative_eq(1.0 + 1e-9, 1e-6));
        assert!(!1.0_f64.relative_eq(1.01, 1e-6));
    }

    #[test]
    fn f64_relative_eq_near_zero_uses_floor() {
        assert!(0.0_f64.relative_eq(1e-13, 1e-6));
        assert!(!0.0_f64.relative_eq(1e-3, 1e-6));
    }

    #[test]
    fn f64_nan_is_never_equal() {
        assert!(!f64::NAN.approximately_eq(f64::NAN));
        assert!(!f64::NAN.relative_eq(f64::NAN, 1e-6));
        assert!(!1.0_f64.relative_eq(f64::NAN, 1e-6));
    }

    #[test]
    fn f64_relative_eq_symmetry() {
        let a = 20.0_f64;
        let b = 20.00001_f64;
        assert_eq!(a.relative_eq(b, 1e-6), b.relative_eq(a, 1e-6));
    }
}
