//! # Swerve module
//!
//! A swerve module is one wheel of the drivetrain, with a drive actuator
//! turning the wheel and a steer actuator setting the wheel's heading. This
//! module turns target module states into actuator demands, and actuator
//! telemetry back into the module's current state and odometry samples.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
pub use params::*;
pub use state::*;
use crate::actuator::ActuatorError;

#[cfg(test)]
pub(crate) use state::test as test_fixtures;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Speed and heading of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    /// Signed wheel speed over the ground.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Heading of the wheel in the robot frame.
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// Distance travelled and heading of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    /// Units: meters
    pub distance_m: f64,

    /// Units: radians
    pub heading_rad: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur in a swerve module.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Actuator error in module {module}: {source}")]
    Actuator {
        module: String,
        #[source]
        source: ActuatorError
    },

    #[error("Invalid parameters for module {module}: {reason}")]
    InvalidParams {
        module: String,
        reason: String
    },

    #[error("No odometry sample {index} in module {module} (there are {len})")]
    NoSample {
        module: String,
        index: usize,
        len: usize
    },
}
