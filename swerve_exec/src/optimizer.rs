//! # Module state optimiser
//!
//! Pure functions used when turning a desired module state into actuator
//! demands. They are applied in order:
//!
//! 1. [`optimize`] picks the equivalent state needing the least steering,
//! 2. [`remove_coupling`] corrects drive readings and demands for the drive
//!    rotation caused by steering,
//! 3. [`reduce_skew`] scales the drive speed down while the wheel is not yet
//!    pointing where it should.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::{FRAC_PI_2, PI};

// Internal
use crate::swerve_module::ModuleState;
use util::maths::{get_ang_dist, wrap_pi};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Minimise the change in heading needed to reach `desired`.
///
/// If the desired heading is more than 90 degrees from the current heading
/// the wheel is instead pointed the opposite way and driven in reverse. The
/// returned heading is in [-pi, pi) and within 90 degrees of
/// `current_heading_rad`.
pub fn optimize(desired: ModuleState, current_heading_rad: f64) -> ModuleState {
    let delta = get_ang_dist(current_heading_rad, desired.heading_rad);

    if delta.abs() > FRAC_PI_2 {
        ModuleState {
            speed_ms: -desired.speed_ms,
            heading_rad: wrap_pi(desired.heading_rad + PI)
        }
    }
    else {
        ModuleState {
            speed_ms: desired.speed_ms,
            heading_rad: wrap_pi(desired.heading_rad)
        }
    }
}

/// Remove the drive motion induced by steering.
///
/// On a coaxial module turning the steer axis also turns the drive wheel by
/// `coupling_ratio` drive rotations per steer rotation. Works on positions
/// (rotations) and velocities (rotations/second) alike.
pub fn remove_coupling(drive: f64, steer: f64, coupling_ratio: f64) -> f64 {
    drive - steer * coupling_ratio
}

/// Scale a drive speed by how well the wheel is aligned with its target
/// heading.
///
/// Prevents the module driving hard in the wrong direction while it is still
/// turning. Fully misaligned (90 degrees) gives zero speed.
pub fn reduce_skew(speed: f64, current_heading_rad: f64, target_heading_rad: f64) -> f64 {
    speed * (target_heading_rad - current_heading_rad).cos()
}
