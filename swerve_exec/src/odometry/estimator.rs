//! Kinematic pose estimator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;

// Internal
use super::PoseEstimator;
use crate::drivetrain::{SwerveKinematics, NUM_MODULES};
use crate::loc::Pose;
use crate::swerve_module::ModulePosition;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Dead reckoning from module positions alone.
///
/// The change in module positions between consecutive snapshots is turned
/// into a twist by the forward kinematics and applied to the pose.
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    pose: Pose,
    prev_positions: Option<[ModulePosition; NUM_MODULES]>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveOdometry {
    pub fn new(kinematics: SwerveKinematics, initial_pose: Pose) -> Self {
        Self {
            kinematics,
            pose: initial_pose,
            prev_positions: None,
        }
    }
}

impl PoseEstimator for SwerveOdometry {
    fn update(&mut self, positions: &[ModulePosition; NUM_MODULES]) -> Pose {
        // The first snapshot only sets the reference
        let prev = match self.prev_positions.replace(*positions) {
            Some(p) => p,
            None => return self.pose
        };

        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for i in 0..NUM_MODULES {
            deltas[i] = ModulePosition {
                distance_m: positions[i].distance_m - prev[i].distance_m,
                heading_rad: positions[i].heading_rad
            };
        }

        let twist = self.kinematics.to_twist(&deltas);
        self.pose = self.pose.exp(&twist);

        trace!("Odometry twist {:?}, pose {:?}", twist, self.pose);

        self.pose
    }

    fn current_pose(&self) -> Pose {
        self.pose
    }

    fn reset_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    const HALF_WIDTH_M: f64 = 0.3;

    fn odometry() -> SwerveOdometry {
        let k = SwerveKinematics::new([
            [HALF_WIDTH_M, HALF_WIDTH_M],
            [HALF_WIDTH_M, -HALF_WIDTH_M],
            [-HALF_WIDTH_M, HALF_WIDTH_M],
            [-HALF_WIDTH_M, -HALF_WIDTH_M],
        ]).unwrap();

        SwerveOdometry::new(k, Pose::default())
    }

    fn all(distance_m: f64, heading_rad: f64) -> [ModulePosition; NUM_MODULES] {
        [ModulePosition { distance_m, heading_rad }; NUM_MODULES]
    }

    #[test]
    fn test_first_update_sets_reference() {
        let mut odom = odometry();

        let pose = odom.update(&all(10.0, 0.0));
        assert_eq!(pose, Pose::default());
    }

    #[test]
    fn test_straight_line() {
        let mut odom = odometry();
        odom.update(&all(0.0, FRAC_PI_2));

        for i in 1..=10 {
            odom.update(&all(0.1 * i as f64, FRAC_PI_2));
        }

        // Wheels pointing left, so the robot moves along +Y
        let pose = odom.current_pose();
        assert!(pose.position_m.x.abs() < 1e-9);
        assert!((pose.position_m.y - 1.0).abs() < 1e-9);
        assert!(pose.heading_rad.abs() < 1e-9);
    }

    #[test]
    fn test_rotation_in_place() {
        let mut odom = odometry();

        // Module headings tangential to the turning circle
        let headings = [3.0 * FRAC_PI_4, FRAC_PI_4, -3.0 * FRAC_PI_4, -FRAC_PI_4];
        let radius = (2.0 * HALF_WIDTH_M * HALF_WIDTH_M).sqrt();

        let snapshot = |angle: f64| {
            let mut s = [ModulePosition::default(); NUM_MODULES];
            for i in 0..NUM_MODULES {
                s[i] = ModulePosition { distance_m: radius * angle, heading_rad: headings[i] };
            }
            s
        };

        odom.update(&snapshot(0.0));
        odom.update(&snapshot(PI / 4.0));
        odom.update(&snapshot(PI / 2.0));

        let pose = odom.current_pose();
        assert!(pose.position_m.norm() < 1e-9);
        assert!((pose.heading_rad - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_reset_pose_keeps_reference() {
        let mut odom = odometry();
        odom.update(&all(0.0, 0.0));
        odom.update(&all(1.0, 0.0));

        odom.reset_pose(Pose::new(5.0, 5.0, 0.0));
        odom.update(&all(1.5, 0.0));

        let pose = odom.current_pose();
        assert!((pose.position_m.x - 5.5).abs() < 1e-9);
        assert!((pose.position_m.y - 5.0).abs() < 1e-9);
    }
}
