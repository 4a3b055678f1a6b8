//! # Odometry module
//!
//! Module positions are sampled on a separate thread at a higher rate than
//! the main loop runs (see [`OdometrySampler`]). Each main loop cycle every
//! module drains its queues into a list of [`OdometrySample`]s, and the lists
//! of all four modules are fused index by index into a sequence of
//! drivetrain wide snapshots. Every snapshot is then given to a
//! [`PoseEstimator`] in order, which gives a more accurate trajectory than
//! only using the latest reading.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod estimator;
mod sample_queue;
mod sampler;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use serde::Serialize;

// Internal
pub use estimator::*;
pub use sample_queue::*;
pub use sampler::*;
use crate::drivetrain::NUM_MODULES;
use crate::loc::Pose;
use crate::swerve_module::ModulePosition;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Integrates module position snapshots into a robot pose.
pub trait PoseEstimator: Send {
    /// Update the estimate with the next snapshot, returning the new pose.
    fn update(&mut self, positions: &[ModulePosition; NUM_MODULES]) -> Pose;

    /// The current pose estimate.
    fn current_pose(&self) -> Pose;

    /// Replace the current pose estimate.
    fn reset_pose(&mut self, pose: Pose);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One high rate reading of a module's position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OdometrySample {
    /// Distance travelled by the wheel, with steering coupling removed.
    ///
    /// Units: meters
    pub drive_distance_m: f64,

    /// Units: radians
    pub steer_heading_rad: f64,

    /// Units: seconds
    pub timestamp_s: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Fuse the samples of every module into drivetrain wide snapshots.
///
/// Samples are matched by index. If the modules have different numbers of
/// samples only the common prefix is used and the rest are discarded.
pub fn fuse(samples: &[&[OdometrySample]; NUM_MODULES]) -> Vec<[ModulePosition; NUM_MODULES]> {
    let num_fused = samples.iter().map(|s| s.len()).min().unwrap_or(0);
    let num_max = samples.iter().map(|s| s.len()).max().unwrap_or(0);

    if num_fused != num_max {
        debug!(
            "Odometry sample counts differ ({:?}), fusing the first {}",
            samples.iter().map(|s| s.len()).collect::<Vec<_>>(),
            num_fused
        );
    }

    (0..num_fused)
        .map(|i| {
            let mut snapshot = [ModulePosition::default(); NUM_MODULES];
            for (m, s) in samples.iter().enumerate() {
                snapshot[m] = ModulePosition {
                    distance_m: s[i].drive_distance_m,
                    heading_rad: s[i].steer_heading_rad
                };
            }
            snapshot
        })
        .collect()
}

/// Number of samples that [`fuse`] will discard.
pub fn num_discarded(samples: &[&[OdometrySample]; NUM_MODULES]) -> usize {
    let num_fused = samples.iter().map(|s| s.len()).min().unwrap_or(0);

    samples.iter().map(|s| s.len() - num_fused).sum()
}
