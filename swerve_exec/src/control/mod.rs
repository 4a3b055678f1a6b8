//! # Control primitives
//!
//! Closed loop building blocks shared by the simulated actuators' integrated
//! controllers and the drivetrain's pose and heading controllers.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod pid;
mod profile;
mod profiled_pid;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use pid::*;
pub use profile::*;
pub use profiled_pid::*;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Wrap `value` into the range `[min, max)`.
///
/// Used for continuous inputs such as headings, where `min` and `max` are the
/// same physical position.
pub fn input_modulus(value: f64, min: f64, max: f64) -> f64 {
    min + util::maths::rem_euclid(value - min, max - min)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_input_modulus() {
        assert!((input_modulus(3.0 * PI / 2.0, -PI, PI) + PI / 2.0).abs() < 1e-12);
        assert!((input_modulus(0.75, -0.5, 0.5) + 0.25).abs() < 1e-12);
        assert!((input_modulus(-0.75, -0.5, 0.5) - 0.25).abs() < 1e-12);
        assert_eq!(input_modulus(0.1, -0.5, 0.5), 0.1);
    }
}
