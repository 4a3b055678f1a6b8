//! # Drivetrain module
//!
//! Coordinates the four swerve modules. Desired robot motion is converted
//! into module states by the kinematics and dispatched to each module, while
//! the modules' odometry samples are fused into the pose estimate once per
//! cycle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
mod kinematics;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cmd::*;
pub use kinematics::*;
pub use params::*;
pub use state::*;
use crate::swerve_module::ModuleError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of swerve modules on the drivetrain.
///
/// Modules are always ordered front left, front right, rear left, rear
/// right.
pub const NUM_MODULES: usize = 4;

/// Module headings which make the robot hardest to push, in module order.
pub const LOCK_HEADINGS_DEG: [f64; NUM_MODULES] = [45.0, -45.0, -45.0, 45.0];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during drivetrain operation.
#[derive(Debug, thiserror::Error)]
pub enum DrivetrainError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("The module positions do not determine the robot's motion")]
    DegenerateGeometry,

    #[error("Invalid drivetrain parameters: {0}")]
    InvalidParams(String),
}
