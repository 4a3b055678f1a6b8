//! # Feedforward model
//!
//! Maps a mechanism's motion state to the voltage needed to sustain it. The
//! gravity compensation style is chosen once per mechanism through
//! [`FeedforwardKind`] and bound to its constants in a [`Feedforward`], so
//! repeated calls only vary the motion state.
//!
//! All quantities are rotation based: position in rotations, velocity in
//! rotations/second and acceleration in rotations/second^2. The result is in
//! volts.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use util::maths::sign;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Feedforward voltage coefficients of a mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedforwardConstants {
    /// Volts required to overcome static friction.
    #[serde(default)]
    pub k_s: f64,

    /// Volts required to hold a velocity of one rotation/second.
    #[serde(default)]
    pub k_v: f64,

    /// Volts required to accelerate by one rotation/second^2.
    #[serde(default)]
    pub k_a: f64,

    /// Volts required to overcome gravity.
    #[serde(default)]
    pub k_g: f64,
}

/// Kinematic snapshot fed to the feedforward calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    /// Units: rotations
    pub position_rot: f64,

    /// Units: rotations/second
    pub velocity_rots: f64,

    /// Units: rotations/second^2
    pub acceleration_rotss: f64,
}

/// A feedforward kind bound to the constants of one mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedforward {
    pub kind: FeedforwardKind,
    pub constants: FeedforwardConstants,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How gravity compensation combines with the base voltage term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedforwardKind {
    /// No gravity term.
    Simple,

    /// Gravity scaled by the cosine of the arm angle, zero angle being
    /// horizontal.
    Arm,

    /// Constant gravity term.
    Elevator,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for FeedforwardKind {
    fn default() -> Self {
        FeedforwardKind::Simple
    }
}

impl FeedforwardKind {
    /// Calculate the feedforward voltage for the given constants and state.
    pub fn calculate(
        &self,
        constants: &FeedforwardConstants,
        state: &MotionState
    ) -> f64 {
        let base = simple(constants, state);

        match self {
            FeedforwardKind::Simple => base,
            FeedforwardKind::Arm => base
                + constants.k_g
                * (state.position_rot * std::f64::consts::TAU).cos(),
            FeedforwardKind::Elevator => base + constants.k_g,
        }
    }
}

impl Feedforward {
    /// Bind a kind to the constants of a mechanism.
    pub fn new(kind: FeedforwardKind, constants: FeedforwardConstants) -> Self {
        Self { kind, constants }
    }

    /// Calculate the feedforward voltage.
    ///
    /// `position_rot` only matters for [`FeedforwardKind::Arm`], where it
    /// must be the current arm position.
    pub fn calculate(
        &self,
        position_rot: f64,
        velocity_rots: f64,
        acceleration_rotss: f64
    ) -> f64 {
        self.kind.calculate(&self.constants, &MotionState {
            position_rot,
            velocity_rots,
            acceleration_rotss
        })
    }

    /// Calculate the feedforward voltage for a mechanism whose position does
    /// not matter.
    pub fn calculate_velocity(&self, velocity_rots: f64, acceleration_rotss: f64) -> f64 {
        self.calculate(0.0, velocity_rots, acceleration_rotss)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn simple(constants: &FeedforwardConstants, state: &MotionState) -> f64 {
    constants.k_s * sign(state.velocity_rots)
        + constants.k_v * state.velocity_rots
        + constants.k_a * state.acceleration_rotss
}
