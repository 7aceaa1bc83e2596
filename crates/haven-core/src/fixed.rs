use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// All amounts, capacities, rates, and accumulated durations in the
/// simulation use this type so that identical inputs always produce
/// identical state, regardless of platform or time-scale.
pub type Fixed64 = I32F32;

/// A duration in simulated seconds (already time-scaled by the host).
pub type Seconds = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display/telemetry, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Clamp a ratio to the unit interval [0, 1].
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::ONE)
}

/// Checked multiplication that returns None on overflow.
#[inline]
pub fn checked_mul_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_mul(b)
}

/// Checked division that returns None on zero divisor.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_basic_arithmetic() {
        let a = f64_to_fixed64(1.5);
        let b = f64_to_fixed64(2.0);
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(f64_to_fixed64(-0.5)), Fixed64::ZERO);
        assert_eq!(clamp_unit(f64_to_fixed64(0.5)), f64_to_fixed64(0.5));
        assert_eq!(clamp_unit(f64_to_fixed64(1.5)), Fixed64::ONE);
    }

    #[test]
    fn checked_mul_overflow() {
        assert!(checked_mul_64(Fixed64::MAX, f64_to_fixed64(2.0)).is_none());
    }

    #[test]
    fn checked_div_by_zero() {
        assert!(checked_div_64(Fixed64::ONE, Fixed64::ZERO).is_none());
    }

    #[test]
    fn fixed64_determinism() {
        let a = f64_to_fixed64(1.0 / 3.0);
        let b = f64_to_fixed64(1.0 / 3.0);
        assert_eq!(a, b);
        assert_eq!(a * f64_to_fixed64(3.0), b * f64_to_fixed64(3.0));
    }
}
