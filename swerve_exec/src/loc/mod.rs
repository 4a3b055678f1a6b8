//! # Localisation module
//!
//! Pose types shared by the odometry and the drivetrain. Poses are in the
//! field frame: the origin and axes are fixed to the field, and heading is
//! measured anticlockwise from the field X axis.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// Internal
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and heading in the field frame) of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The position in the field frame
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Heading of the robot, in [-pi, pi).
    ///
    /// Units: radians
    pub heading_rad: f64,
}

/// A change in pose along a constant curvature arc, expressed in the frame
/// of the pose at the start of the arc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Twist {
    /// Units: meters
    pub dx_m: f64,

    /// Units: meters
    pub dy_m: f64,

    /// Units: radians
    pub dtheta_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector2::zeros(),
            heading_rad: 0.0,
        }
    }
}

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad: wrap_pi(heading_rad),
        }
    }

    /// Rotation from the robot frame into the field frame.
    pub fn rotation(&self) -> Rotation2<f64> {
        Rotation2::new(self.heading_rad)
    }

    /// Apply a twist to this pose, moving along the arc it describes.
    pub fn exp(&self, twist: &Twist) -> Pose {
        let theta = twist.dtheta_rad;

        // Series expansion near zero avoids dividing by a vanishing angle
        let (s, c) = if theta.abs() < 1e-9 {
            (1.0 - theta * theta / 6.0, 0.5 * theta)
        }
        else {
            (theta.sin() / theta, (1.0 - theta.cos()) / theta)
        };

        let delta_rb = Vector2::new(
            twist.dx_m * s - twist.dy_m * c,
            twist.dx_m * c + twist.dy_m * s
        );

        Pose {
            position_m: self.position_m + self.rotation() * delta_rb,
            heading_rad: wrap_pi(self.heading_rad + theta),
        }
    }

    /// Vector from this pose to `target`, in the field frame.
    pub fn translation_to(&self, target: &Pose) -> Vector2<f64> {
        target.position_m - self.position_m
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_straight_twist() {
        let pose = Pose::new(1.0, 2.0, FRAC_PI_2);
        let out = pose.exp(&Twist { dx_m: 1.0, dy_m: 0.0, dtheta_rad: 0.0 });

        // Robot faces +Y, so forward motion moves along +Y
        assert!((out.position_m - Vector2::new(1.0, 3.0)).norm() < 1e-12);
        assert!((out.heading_rad - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_arc_twist() {
        // Quarter circle of radius 1 turning left
        let out = Pose::default().exp(&Twist {
            dx_m: FRAC_PI_2,
            dy_m: 0.0,
            dtheta_rad: FRAC_PI_2
        });

        assert!((out.position_m - Vector2::new(1.0, 1.0)).norm() < 1e-12);
        assert!((out.heading_rad - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_heading_wraps() {
        let pose = Pose::new(0.0, 0.0, PI - 0.1);
        let out = pose.exp(&Twist { dx_m: 0.0, dy_m: 0.0, dtheta_rad: 0.2 });

        assert!((out.heading_rad - (-PI + 0.1)).abs() < 1e-12);
        assert!(out.position_m.norm() < 1e-12);
    }
}
