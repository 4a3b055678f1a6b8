//! Parameters structure for the drivetrain

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::NUM_MODULES;
use crate::control::Constraints;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the drivetrain.
#[derive(Debug, Clone, Deserialize)]
pub struct DrivetrainParams {

    // ---- GEOMETRY ----

    /// Position of each module relative to the robot centre, in module
    /// order. X is forwards and Y is to the left.
    ///
    /// Units: meters,
    /// Frame: Robot body
    pub module_pos_m_rb: [[f64; 2]; NUM_MODULES],

    // ---- CAPABILITIES ----

    /// Maximum speed of any module.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Maximum rotation rate of the robot.
    ///
    /// Units: radians/second
    pub max_rotation_rads: f64,

    // ---- CLOSED LOOP COMMANDS ----

    /// Controller for the X and Y position of the robot.
    pub translation_ctrl: ControllerParams,

    /// Controller for the heading of the robot.
    pub rotation_ctrl: ControllerParams,

    /// Time after which a closed loop command which has not converged is
    /// abandoned.
    ///
    /// Units: seconds
    pub closed_loop_timeout_s: f64,

    // ---- TIMING ----

    /// Period of the main loop.
    ///
    /// Units: seconds
    pub loop_period_s: f64,
}

/// Gains, limits and tolerance of a profiled controller.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ControllerParams {
    pub k_p: f64,

    #[serde(default)]
    pub k_i: f64,

    #[serde(default)]
    pub k_d: f64,

    pub constraints: Constraints,

    /// Error within which the goal is considered reached.
    pub tolerance: f64,
}
