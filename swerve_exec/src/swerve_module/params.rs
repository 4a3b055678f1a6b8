//! Parameters structure for a swerve module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::actuator::ActuatorConfig;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters shared by every module of the drivetrain.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleParams {

    // ---- GEOMETRY ----

    /// Units: meters
    pub wheel_diameter_m: f64,

    /// Drive wheel rotations caused by one rotation of the steer axis.
    pub coupling_ratio: f64,

    // ---- CAPABILITIES ----

    /// Maximum wheel speed.
    ///
    /// Units: meters/second
    pub max_speed_ms: f64,

    /// Voltage corresponding to full output in open loop driving.
    ///
    /// Units: volts
    pub voltage_comp_saturation_v: f64,

    // ---- ACTUATORS ----

    /// Drive actuator configuration. The gear ratio is motor rotations per
    /// wheel rotation.
    pub drive: ActuatorConfig,

    /// Steer actuator configuration. The gear ratio is motor rotations per
    /// module rotation.
    pub steer: ActuatorConfig,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ModuleParams {
    /// Wheel circumference.
    ///
    /// Units: meters
    pub fn wheel_circumference_m(&self) -> f64 {
        std::f64::consts::PI * self.wheel_diameter_m
    }

    /// Convert a distance or speed in meters into wheel rotations.
    pub fn meters_to_rotations(&self, meters: f64) -> f64 {
        meters / self.wheel_circumference_m()
    }

    /// Convert wheel rotations into a distance or speed in meters.
    pub fn rotations_to_meters(&self, rotations: f64) -> f64 {
        rotations * self.wheel_circumference_m()
    }
}
