//! # Actuator abstraction
//!
//! This module provides a unified interface over the motor controllers that
//! drive the swerve modules, so that the module and drivetrain logic does not
//! depend on any one vendor.
//!
//! Each actuator family implements [`Actuator`]. Capabilities a family does
//! not have (closed loop modes on an encoder-less controller, for example)
//! are reported as [`ActuatorError::Unsupported`] rather than silently
//! ignored, since asking for them indicates a wiring or configuration mistake.
//!
//! Two units are used for positions and velocities:
//! - "motor" units are rotations of the motor shaft,
//! - "system" units are rotations of the driven mechanism, i.e. motor units
//!   divided by the configured gear ratio.
//!
//! Closed loop targets are always issued in motor units.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod pwm;
mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Internal
pub use pwm::*;
pub use sim::*;
use crate::feedforward::{Feedforward, FeedforwardConstants, FeedforwardKind};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of gain slots held by each actuator.
pub const NUM_SLOTS: usize = 3;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Capability interface over a physical or simulated actuator.
pub trait Actuator: Send {

    /// Human readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Bus identifier of the device.
    fn device_id(&self) -> u32;

    /// Apply a full configuration.
    ///
    /// Either the whole configuration is applied or, on error, none of it is.
    fn configure(&mut self, config: &ActuatorConfig) -> Result<(), ActuatorError>;

    /// Issue a setpoint under the given control mode.
    fn set_output(&mut self, mode: ControlMode, value: f64) -> Result<(), ActuatorError>;

    /// Issue a setpoint with an additional feedforward voltage.
    fn set_output_with_feedforward(
        &mut self,
        mode: ControlMode,
        value: f64,
        feedforward_v: f64
    ) -> Result<(), ActuatorError>;

    /// Get the active gain slot.
    fn current_slot(&self) -> Result<GainSlot, ActuatorError>;

    /// Replace one gain slot, leaving the others untouched.
    fn reset_slot(&mut self, slot: GainSlot, index: usize) -> Result<(), ActuatorError>;

    /// Make the given slot the active one for subsequent setpoints. The
    /// slot's gains and feedforward are applied together.
    fn select_slot(&mut self, index: usize) -> Result<(), ActuatorError>;

    /// Refresh the cached values of the given signals in one bus
    /// transaction. Reads between refreshes return the cached values.
    fn refresh_signals(&mut self, signals: &[Signal]) -> Result<(), ActuatorError>;

    /// Motor shaft position in rotations.
    fn motor_position(&self) -> Result<f64, ActuatorError>;

    /// Motor shaft velocity in rotations/second.
    fn motor_velocity(&self) -> Result<f64, ActuatorError>;

    /// Mechanism position in rotations.
    fn system_position(&self) -> Result<f64, ActuatorError>;

    /// Mechanism velocity in rotations/second.
    fn system_velocity(&self) -> Result<f64, ActuatorError>;

    /// Most recently refreshed applied voltage.
    fn voltage(&self) -> Result<f64, ActuatorError>;

    /// Reseed the integrated encoder with a motor position in rotations.
    fn set_motor_position(&mut self, position_rot: f64) -> Result<(), ActuatorError>;

    /// Mirror the output of another device on the same bus.
    fn set_follower_of(&mut self, leader_id: u32) -> Result<(), ActuatorError>;

    /// Get a handle to a signal which can be sampled from another thread
    /// at a higher rate than the main loop. Position and velocity are in
    /// system units.
    fn raw_signal(&self, signal: Signal) -> Result<Arc<dyn SignalSource>, ActuatorError>;

    /// Bring the output to neutral.
    fn stop(&mut self) -> Result<(), ActuatorError>;
}

/// A signal which can be read independently of the owning actuator.
pub trait SignalSource: Send + Sync {
    /// Read the latest value, or `None` if the device could not provide one.
    fn read(&self) -> Option<f64>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A set of closed loop gains and the feedforward that goes with them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GainSlot {
    #[serde(default)]
    pub k_p: f64,
    #[serde(default)]
    pub k_i: f64,
    #[serde(default)]
    pub k_d: f64,
    #[serde(default)]
    pub k_v: f64,
    #[serde(default)]
    pub k_a: f64,
    #[serde(default)]
    pub k_s: f64,
    #[serde(default)]
    pub k_g: f64,

    /// How `k_g` is applied.
    #[serde(default)]
    pub gravity: FeedforwardKind,
}

/// Full configuration of an actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Reverse the positive direction of the output and sensors.
    #[serde(default)]
    pub inverted: bool,

    #[serde(default)]
    pub idle_mode: IdleMode,

    /// Units: amps
    #[serde(default)]
    pub stator_current_limit_a: Option<f64>,

    /// Time to ramp from neutral to full output in open loop modes.
    ///
    /// Units: seconds
    #[serde(default)]
    pub open_loop_ramp_s: f64,

    /// Time to ramp from neutral to full output in closed loop modes.
    ///
    /// Units: seconds
    #[serde(default)]
    pub closed_loop_ramp_s: f64,

    /// Treat the mechanism position as wrapping every system rotation, so
    /// position loops take the shortest path.
    #[serde(default)]
    pub closed_loop_continuous_wrap: bool,

    /// Motor rotations per mechanism rotation.
    #[serde(default = "default_gear_ratio")]
    pub gear_ratio: f64,

    /// Acceleration limit of the profiled velocity mode, `None` for no
    /// limit.
    ///
    /// Units: motor rotations/second^2
    #[serde(default)]
    pub profile_max_acceleration: Option<f64>,

    #[serde(default)]
    pub slots: [GainSlot; NUM_SLOTS],

    /// Index of the slot that is active after configuration.
    #[serde(default)]
    pub slot_to_use: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Closed loop behaviour of a setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Units: volts
    Voltage,
    /// Units: amps
    Current,
    /// Fraction of the available output, -1 to +1
    Percentage,
    /// Units: motor rotations
    Position,
    /// Units: motor rotations/second
    Velocity,
    /// Velocity reached along an acceleration limited profile.
    ///
    /// Units: motor rotations/second
    ProfiledVelocity,
}

/// Telemetry signals which can be refreshed and sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Position,
    Velocity,
    Voltage,
    Current,
}

/// Behaviour of the motor at neutral output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleMode {
    Coast,
    Brake,
}

/// Possible errors that can occur while using an actuator.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("The configuration of {actuator} was rejected by the bus: {reason}")]
    ConfigRejected {
        actuator: String,
        reason: String
    },

    #[error("Invalid configuration for {actuator}: {reason}")]
    InvalidConfig {
        actuator: String,
        reason: String
    },

    #[error("{actuator} does not support {operation}")]
    Unsupported {
        actuator: String,
        operation: String
    },

    #[error("Gain slot index {0} is out of range (there are {} slots)", NUM_SLOTS)]
    InvalidSlot(usize),

    #[error("{0} has not been configured")]
    NotConfigured(String),

    #[error("No device with ID {0} is present on the bus")]
    DeviceNotFound(u32),

    #[error("The output driver of {actuator} failed: {reason}")]
    Driver {
        actuator: String,
        reason: String
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GainSlot {
    /// The feedforward described by this slot.
    pub fn feedforward(&self) -> Feedforward {
        Feedforward::new(self.gravity, FeedforwardConstants {
            k_s: self.k_s,
            k_v: self.k_v,
            k_a: self.k_a,
            k_g: self.k_g,
        })
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            inverted: false,
            idle_mode: IdleMode::default(),
            stator_current_limit_a: None,
            open_loop_ramp_s: 0.0,
            closed_loop_ramp_s: 0.0,
            closed_loop_continuous_wrap: false,
            gear_ratio: default_gear_ratio(),
            profile_max_acceleration: None,
            slots: [GainSlot::default(); NUM_SLOTS],
            slot_to_use: 0,
        }
    }
}

impl ActuatorConfig {
    /// Check the configuration is self consistent.
    pub fn validate(&self, actuator: &str) -> Result<(), ActuatorError> {
        let invalid = |reason: &str| Err(ActuatorError::InvalidConfig {
            actuator: actuator.into(),
            reason: reason.into()
        });

        if !(self.gear_ratio > 0.0) {
            return invalid("gear ratio must be positive");
        }
        if self.open_loop_ramp_s < 0.0 || self.closed_loop_ramp_s < 0.0 {
            return invalid("ramp periods cannot be negative");
        }
        if let Some(a) = self.stator_current_limit_a {
            if !(a > 0.0) {
                return invalid("current limit must be positive");
            }
        }
        if let Some(a) = self.profile_max_acceleration {
            if !(a > 0.0) {
                return invalid("profile acceleration must be positive");
            }
        }
        if self.slot_to_use >= NUM_SLOTS {
            return Err(ActuatorError::InvalidSlot(self.slot_to_use));
        }

        Ok(())
    }
}

impl Default for IdleMode {
    fn default() -> Self {
        IdleMode::Brake
    }
}

impl ControlMode {
    /// Returns true if the mode is closed loop on the integrated sensor.
    pub fn is_closed_loop(&self) -> bool {
        matches!(
            self,
            ControlMode::Position | ControlMode::Velocity | ControlMode::ProfiledVelocity
        )
    }
}

impl ActuatorError {
    /// Shorthand for an unsupported operation on the given actuator.
    pub fn unsupported(actuator: &str, operation: &str) -> Self {
        ActuatorError::Unsupported {
            actuator: actuator.into(),
            operation: operation.into()
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_gear_ratio() -> f64 {
    1.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_validation() {
        let cfg = ActuatorConfig::default();
        assert!(cfg.validate("test").is_ok());

        let mut bad = cfg.clone();
        bad.gear_ratio = 0.0;
        assert!(matches!(bad.validate("test"), Err(ActuatorError::InvalidConfig { .. })));

        let mut bad = cfg.clone();
        bad.slot_to_use = NUM_SLOTS;
        assert!(matches!(bad.validate("test"), Err(ActuatorError::InvalidSlot(3))));
    }

    #[test]
    fn test_slot_feedforward() {
        let slot = GainSlot {
            k_s: 0.1,
            k_v: 1.0,
            k_g: 0.5,
            gravity: FeedforwardKind::Elevator,
            ..Default::default()
        };

        let ff = slot.feedforward();
        assert_eq!(ff.kind, FeedforwardKind::Elevator);
        assert!((ff.calculate_velocity(1.0, 0.0) - 1.6).abs() < 1e-12);
    }

    #[test]
    fn test_config_from_toml() {
        let cfg: ActuatorConfig = util::params::from_str(r#"
            inverted = true
            gear_ratio = 6.75
            closed_loop_continuous_wrap = false

            [[slots]]
            k_p = 0.1
            k_v = 0.12

            [[slots]]
            k_p = 2.0

            [[slots]]
        "#).unwrap();

        assert!(cfg.inverted);
        assert_eq!(cfg.gear_ratio, 6.75);
        assert_eq!(cfg.slots[0].k_v, 0.12);
        assert_eq!(cfg.slots[1].k_p, 2.0);
        assert_eq!(cfg.slots[2], GainSlot::default());
        assert_eq!(cfg.idle_mode, IdleMode::Brake);
    }
}
