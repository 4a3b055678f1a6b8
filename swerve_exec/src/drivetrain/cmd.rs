//! Commands passed into the drivetrain

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::loc::Pose;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command to the drivetrain.
///
/// Commands other than [`DriveCmd::ResetGyro`] stay active, being executed
/// every cycle, until replaced or until they finish.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum DriveCmd {
    /// Drive at a constant velocity.
    OrientationBased {
        /// Units: meters/second
        vx_ms: f64,
        /// Units: meters/second
        vy_ms: f64,
        /// Units: radians/second
        omega_rads: f64,
        /// Velocities are in the field frame rather than the robot frame.
        field_relative: bool,
        /// Use closed loop velocity control on the drive actuators.
        closed_loop: bool,
    },

    /// Drive to a pose, finishing once there.
    ToPose(Pose),

    /// Turn on the spot to face the position of a pose, finishing once
    /// facing it.
    RotateToTarget(Pose),

    /// Drive at a constant velocity while facing the position of a pose.
    DriveWithTarget {
        /// Units: meters/second
        vx_ms: f64,
        /// Units: meters/second
        vy_ms: f64,
        target: Pose,
        field_relative: bool,
    },

    /// Point the wheels inwards to resist being pushed.
    Lock,

    /// Bring all modules to neutral.
    Stop,

    /// Make the current heading the zero heading. Does not replace the
    /// active command.
    ResetGyro,
}

/// Progress of a closed loop command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CmdStatus {
    /// Still working towards the target.
    Running,

    /// Reached the target within tolerance.
    Converged,

    /// Gave up after the closed loop timeout.
    TimedOut,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CmdStatus {
    /// Returns true if the command has ended.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CmdStatus::Running)
    }
}
