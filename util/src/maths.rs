//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value between a minimum and maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Return the sign of a value as -1, 0 or +1.
///
/// Unlike `Float::signum` zero (of either sign) maps to zero.
pub fn sign<T>(value: T) -> T
where
    T: Float
{
    if value > T::zero() {
        T::one()
    }
    else if value < T::zero() {
        -T::one()
    }
    else {
        T::zero()
    }
}

/// Wrap an angle into the canonical range [-pi, pi).
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap();
    let tau_t: T = T::from(std::f64::consts::TAU).unwrap();

    rem_euclid(angle + pi_t, tau_t) - pi_t
}

/// Get the signed angular distance from `a` to `b`.
///
/// This function will return the shortest signed distance between a and b 
/// accounting for wrapping, in the range [-pi, pi). The inputs may be in any
/// range.
pub fn get_ang_dist<T>(a: T, b: T) -> T
where
    T: Float
{
    wrap_pi(b - a)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;
    const PI: f64 = std::f64::consts::PI;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_get_ang_dist() {
        assert_close(get_ang_dist(1f64, 2f64), 1f64);
        assert_close(get_ang_dist(2f64, 1f64), -1f64);
        assert_close(get_ang_dist(0f64, TAU), 0f64);
        assert_close(get_ang_dist(TAU, 0f64), 0f64);
        assert_close(get_ang_dist(1f64, TAU), -1f64);
        assert_close(get_ang_dist(0f64, TAU - 1f64), -1f64);
        assert_close(get_ang_dist(TAU - 1f64, 1f64), 2f64);
        assert_close(get_ang_dist(-3f64 * PI / 4f64, 3f64 * PI / 4f64), -PI / 2f64);
    }

    #[test]
    fn test_wrap_pi() {
        assert_close(wrap_pi(0f64), 0f64);
        assert_close(wrap_pi(PI / 2f64), PI / 2f64);
        assert_close(wrap_pi(3f64 * PI / 2f64), -PI / 2f64);
        assert_close(wrap_pi(-3f64 * PI / 2f64), PI / 2f64);
        assert_close(wrap_pi(5f64 * TAU + 0.25), 0.25);
        assert_close(wrap_pi(PI), -PI);
    }

    #[test]
    fn test_sign() {
        assert_eq!(sign(3.2f64), 1f64);
        assert_eq!(sign(-0.001f64), -1f64);
        assert_eq!(sign(0f64), 0f64);
        assert_eq!(sign(-0f64), 0f64);
    }

    #[test]
    fn test_lin_map_and_clamp() {
        assert_close(lin_map((-1f64, 1f64), (1f64, 2f64), 0f64), 1.5);
        assert_eq!(clamp(&5f64, &-1f64, &1f64), 1f64);
        assert_eq!(clamp(&-5f64, &-1f64, &1f64), -1f64);
        assert_eq!(clamp(&0.5f64, &-1f64, &1f64), 0.5);
    }
}
