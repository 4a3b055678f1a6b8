//! Swerve drive kinematics
//!
//! Converts between robot frame chassis speeds and the speed and heading of
//! each module. Inverse kinematics (chassis to modules) is exact; forward
//! kinematics (modules to chassis) is a least squares fit, since four module
//! vectors overdetermine the three chassis degrees of freedom.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Rotation2, Vector2, Vector3};
use serde::Serialize;

// Internal
use super::{DrivetrainError, NUM_MODULES};
use crate::loc::Twist;
use crate::swerve_module::{ModulePosition, ModuleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Velocity of the robot body in the robot frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChassisSpeeds {
    /// Forwards velocity.
    ///
    /// Units: meters/second
    pub vx_ms: f64,

    /// Leftwards velocity.
    ///
    /// Units: meters/second
    pub vy_ms: f64,

    /// Anticlockwise rotation rate.
    ///
    /// Units: radians/second
    pub omega_rads: f64,
}

/// Kinematics of a drivetrain with a fixed module layout.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    /// Module positions relative to the robot centre, in the robot frame.
    ///
    /// Units: meters
    module_pos_m_rb: [Vector2<f64>; NUM_MODULES],

    /// Inverse of the normal matrix of the forward kinematics least squares
    /// problem, which only depends on the geometry.
    normal_inv: Matrix3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChassisSpeeds {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self { vx_ms, vy_ms, omega_rads }
    }

    /// Convert a field relative velocity into robot relative speeds, given
    /// the robot's heading.
    pub fn from_field_relative(
        vx_ms: f64,
        vy_ms: f64,
        omega_rads: f64,
        heading_rad: f64
    ) -> Self {
        let v_rb = Rotation2::new(-heading_rad) * Vector2::new(vx_ms, vy_ms);

        Self {
            vx_ms: v_rb.x,
            vy_ms: v_rb.y,
            omega_rads
        }
    }
}

impl SwerveKinematics {
    /// Create the kinematics for the given module positions.
    ///
    /// Fails if the positions cannot determine the robot's motion, for
    /// instance if every module is in the same place.
    pub fn new(module_pos_m_rb: [[f64; 2]; NUM_MODULES]) -> Result<Self, DrivetrainError> {
        let pos: Vec<Vector2<f64>> = module_pos_m_rb
            .iter()
            .map(|p| Vector2::new(p[0], p[1]))
            .collect();
        let pos = [pos[0], pos[1], pos[2], pos[3]];

        // Each module contributes rows [1, 0, -y] and [0, 1, x] to A, so
        // A^T A can be summed directly.
        let mut normal = Matrix3::zeros();
        for p in pos.iter() {
            let row_x = Vector3::new(1.0, 0.0, -p.y);
            let row_y = Vector3::new(0.0, 1.0, p.x);
            normal += row_x * row_x.transpose() + row_y * row_y.transpose();
        }

        let normal_inv = normal
            .try_inverse()
            .ok_or(DrivetrainError::DegenerateGeometry)?;

        Ok(Self {
            module_pos_m_rb: pos,
            normal_inv
        })
    }

    pub fn module_positions(&self) -> &[Vector2<f64>; NUM_MODULES] {
        &self.module_pos_m_rb
    }

    /// Calculate the state each module needs for the robot to move at the
    /// given speeds.
    ///
    /// A module with no speed demand is given a heading of zero, callers
    /// which want to hold the last heading must do so themselves.
    pub fn to_module_states(&self, speeds: &ChassisSpeeds) -> [ModuleState; NUM_MODULES] {
        let mut states = [ModuleState::default(); NUM_MODULES];

        for (state, p) in states.iter_mut().zip(self.module_pos_m_rb.iter()) {
            let vx = speeds.vx_ms - speeds.omega_rads * p.y;
            let vy = speeds.vy_ms + speeds.omega_rads * p.x;

            *state = ModuleState {
                speed_ms: vx.hypot(vy),
                heading_rad: if vx == 0.0 && vy == 0.0 { 0.0 } else { vy.atan2(vx) }
            };
        }

        states
    }

    /// Scale module speeds down so none exceeds `max_speed_ms`, preserving
    /// the ratios between them. Returns true if any scaling was applied.
    pub fn desaturate(states: &mut [ModuleState; NUM_MODULES], max_speed_ms: f64) -> bool {
        let fastest = states
            .iter()
            .map(|s| s.speed_ms.abs())
            .fold(0f64, f64::max);

        if fastest <= max_speed_ms {
            return false;
        }

        let scale = max_speed_ms / fastest;
        for s in states.iter_mut() {
            s.speed_ms *= scale;
        }

        true
    }

    /// Estimate the chassis speeds from measured module states.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let x = self.solve(states.iter().map(|s| (s.speed_ms, s.heading_rad)));

        ChassisSpeeds {
            vx_ms: x[0],
            vy_ms: x[1],
            omega_rads: x[2]
        }
    }

    /// Estimate the motion of the robot from the change in module positions
    /// between two snapshots.
    ///
    /// `deltas` holds the distance travelled by each module and the heading
    /// it travelled at.
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist {
        let x = self.solve(deltas.iter().map(|d| (d.distance_m, d.heading_rad)));

        Twist {
            dx_m: x[0],
            dy_m: x[1],
            dtheta_rad: x[2]
        }
    }

    /// Least squares solution of `A x = b`, where `b` holds the module
    /// vectors given as (magnitude, heading) pairs.
    fn solve<I>(&self, vectors: I) -> Vector3<f64>
    where
        I: Iterator<Item = (f64, f64)>
    {
        let mut rhs = Vector3::zeros();

        for ((magnitude, heading), p) in vectors.zip(self.module_pos_m_rb.iter()) {
            let bx = magnitude * heading.cos();
            let by = magnitude * heading.sin();

            // A^T b
            rhs += Vector3::new(bx, by, -p.y * bx + p.x * by);
        }

        self.normal_inv * rhs
    }
}
